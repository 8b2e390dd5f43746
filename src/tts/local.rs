//! Offline speech through an espeak-ng compatible engine.

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::SynthesisError;
use crate::config::LocalTtsSettings;

/// Runs the configured engine as a subprocess, text on stdin, WAV out.
pub struct LocalEngine {
    settings: LocalTtsSettings,
}

impl LocalEngine {
    pub fn new(settings: LocalTtsSettings) -> Self {
        Self { settings }
    }

    pub fn command(&self) -> &str {
        &self.settings.command
    }

    /// Engine arguments for writing `output`.
    ///
    /// Volume 0.0-1.0 maps to espeak amplitude 0-200.
    pub fn args(&self, output: &Path) -> Vec<String> {
        let amplitude = (self.settings.volume.clamp(0.0, 1.0) * 200.0).round() as u32;
        let mut args = vec![
            "-s".to_string(),
            self.settings.rate.to_string(),
            "-a".to_string(),
            amplitude.to_string(),
        ];
        if let Some(voice) = &self.settings.voice_id {
            args.push("-v".to_string());
            args.push(voice.clone());
        }
        args.push("-w".to_string());
        args.push(output.to_string_lossy().into_owned());
        // read text from stdin
        args.push("--stdin".to_string());
        args
    }

    pub async fn synthesize(&self, text: &str, output: &Path) -> Result<(), SynthesisError> {
        log::debug!("Running {} for {}", self.settings.command, output.display());

        let mut child = Command::new(&self.settings.command)
            .args(self.args(output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    SynthesisError::EngineNotFound {
                        command: self.settings.command.clone(),
                    }
                } else {
                    SynthesisError::Io(e)
                }
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(text.as_bytes()).await?;
            stdin.shutdown().await?;
        }

        let result = child.wait_with_output().await?;
        if !result.status.success() {
            return Err(SynthesisError::EngineFailed {
                command: self.settings.command.clone(),
                exit_code: result.status.code(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        if !output.exists() {
            return Err(SynthesisError::EngineFailed {
                command: self.settings.command.clone(),
                exit_code: result.status.code(),
                stderr: format!("no output written to {}", output.display()),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args() {
        let engine = LocalEngine::new(LocalTtsSettings {
            command: "espeak-ng".into(),
            rate: 170,
            volume: 0.5,
            voice_id: Some("ko".into()),
        });
        let args = engine.args(Path::new("/tmp/section_001.wav"));
        assert_eq!(
            args,
            vec!["-s", "170", "-a", "100", "-v", "ko", "-w", "/tmp/section_001.wav", "--stdin"]
        );
    }

    #[test]
    fn test_volume_is_clamped() {
        let engine = LocalEngine::new(LocalTtsSettings {
            volume: 3.0,
            voice_id: None,
            ..LocalTtsSettings::default()
        });
        let args = engine.args(Path::new("out.wav"));
        assert_eq!(args[3], "200");
        assert!(!args.contains(&"-v".to_string()));
    }

    #[tokio::test]
    async fn test_missing_engine() {
        let engine = LocalEngine::new(LocalTtsSettings {
            command: "definitely-not-a-tts-engine".into(),
            ..LocalTtsSettings::default()
        });
        let err = engine
            .synthesize("안녕하세요", Path::new("/tmp/never.wav"))
            .await
            .unwrap_err();
        assert!(matches!(err, SynthesisError::EngineNotFound { .. }));
    }
}
