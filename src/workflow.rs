//! Stage orchestration.
//!
//! Every stage reads the previous stage's artifact and writes its own under
//! `output.base_dir`, so running the stages one by one leaves the same files
//! as a single `generate` run.

use std::path::{Path, PathBuf};

use crate::ai::AiService;
use crate::cache::ResponseCache;
use crate::config::{AiProviderKind, PrivacyStatus, Settings, TtsProviderKind};
use crate::interrupt::ctrlc_received;
use crate::models::{AudioSegment, Presentation, Script, ScriptInput, TimingManifest};
use crate::retry::RetryPolicy;
use crate::script::ScriptGenerator;
use crate::slides::PresentationGenerator;
use crate::sync::SyncService;
use crate::tts::{load_segments, SynthesisError, TtsGenerator, TtsProvider};
use crate::util::{sanitize_filename, MAX_FILENAME_LENGTH};
use crate::video::{manifest_path, VideoGenerator};
use crate::youtube::{Authenticator, UploadRequest, UploadedVideo, VideoStatus, YouTubeService};
use crate::{Error, Result};

/// Default artifact locations under a base directory.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    base: PathBuf,
}

impl OutputPaths {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn name(title: &str) -> String {
        sanitize_filename(title, MAX_FILENAME_LENGTH)
    }

    pub fn script(&self, topic: &str) -> PathBuf {
        self.base.join("scripts").join(format!("{}.json", Self::name(topic)))
    }

    pub fn presentation(&self, title: &str) -> PathBuf {
        self.base
            .join("presentations")
            .join(format!("{}.pptx", Self::name(title)))
    }

    pub fn slides_dir(&self, title: &str) -> PathBuf {
        self.base.join("slides").join(Self::name(title))
    }

    pub fn audio_dir(&self, title: &str) -> PathBuf {
        self.base.join("audio").join(Self::name(title))
    }

    pub fn video(&self, title: &str) -> PathBuf {
        self.base.join("videos").join(format!("{}.mp4", Self::name(title)))
    }
}

/// Options for a full `generate` run.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub input: ScriptInput,
    pub ai_provider: Option<AiProviderKind>,
    pub tts_provider: Option<TtsProviderKind>,
    pub use_cache: bool,
    pub transitions: bool,
    pub upload: bool,
    pub privacy: Option<PrivacyStatus>,
}

impl GenerateOptions {
    pub fn new(input: ScriptInput) -> Self {
        Self {
            input,
            ai_provider: None,
            tts_provider: None,
            use_cache: true,
            transitions: true,
            upload: false,
            privacy: None,
        }
    }
}

/// Everything a `generate` run produced.
#[derive(Debug, Clone)]
pub struct GenerateOutcome {
    pub script_path: PathBuf,
    pub presentation_path: PathBuf,
    pub audio_dir: PathBuf,
    pub video_path: PathBuf,
    pub manifest_path: PathBuf,
    pub uploaded: Option<UploadedVideo>,
}

pub struct Workflow {
    settings: Settings,
    paths: OutputPaths,
    retry: Option<RetryPolicy>,
    cache_dir: Option<PathBuf>,
    ffmpeg: Option<String>,
}

impl Workflow {
    pub fn new(settings: Settings) -> Self {
        let paths = OutputPaths::new(settings.output.base_dir.clone());
        Self {
            settings,
            paths,
            retry: None,
            cache_dir: None,
            ffmpeg: None,
        }
    }

    /// Retry policy for provider calls instead of the defaults.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Store LLM responses here instead of the user cache directory.
    pub fn with_cache_dir(mut self, dir: PathBuf) -> Self {
        self.cache_dir = Some(dir);
        self
    }

    /// Encode with this ffmpeg binary instead of the one on PATH.
    pub fn with_ffmpeg(mut self, program: impl Into<String>) -> Self {
        self.ffmpeg = Some(program.into());
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    fn script_generator(
        &self,
        provider: Option<AiProviderKind>,
        use_cache: bool,
    ) -> Result<ScriptGenerator> {
        let service = AiService::from_settings(&self.settings, provider)?;
        let client = match self.retry {
            Some(retry) => crate::ai::AiClient::new(service, retry),
            None => service.into_client(),
        };
        let mut generator = ScriptGenerator::new(client);
        if use_cache && self.settings.script.cache {
            let cache = match &self.cache_dir {
                Some(dir) => ResponseCache::new(dir.clone()),
                None => ResponseCache::with_default_dir(),
            };
            generator = generator.with_cache(cache);
        }
        Ok(generator)
    }

    fn tts_generator(&self, provider: Option<TtsProviderKind>) -> Result<TtsGenerator> {
        let provider = TtsProvider::from_settings(&self.settings, provider)?;
        let mut generator = TtsGenerator::new(provider);
        if let Some(retry) = self.retry {
            generator = generator.with_retry_policy(retry);
        }
        Ok(generator)
    }

    /// Read a script JSON file written by the script stage.
    pub fn load_script(&self, path: &Path) -> Result<Script> {
        if !path.exists() {
            return Err(Error::MissingInput {
                what: "Script",
                path: path.to_path_buf(),
            });
        }
        Script::load(path)
    }

    /// Generate a script and save it as JSON.
    pub async fn script(
        &self,
        input: &ScriptInput,
        provider: Option<AiProviderKind>,
        use_cache: bool,
        output: Option<&Path>,
    ) -> Result<(Script, PathBuf)> {
        let generator = self.script_generator(provider, use_cache)?;
        let script = generator.generate(input).await?;

        let path = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.paths.script(&input.topic));
        script.save(&path)?;
        log::info!("Script saved: {} ({} scenes)", path.display(), script.scenes.len());
        Ok((script, path))
    }

    /// Write the deck and render its slide images.
    pub fn presentation(&self, script: &Script, output: Option<&Path>) -> Result<Presentation> {
        let generator = PresentationGenerator::new(self.settings.presentation.clone());
        let path = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.paths.presentation(&script.title));

        let mut presentation = generator.generate(script, &path)?;
        generator.export_images(&mut presentation, &self.paths.slides_dir(&script.title))?;
        Ok(presentation)
    }

    /// Read an existing deck and render its slide images.
    pub fn load_presentation(&self, path: &Path, script: &Script) -> Result<Presentation> {
        if !path.exists() {
            return Err(Error::MissingInput {
                what: "Presentation",
                path: path.to_path_buf(),
            });
        }
        let generator = PresentationGenerator::new(self.settings.presentation.clone());
        let mut presentation = PresentationGenerator::load(path)?;
        generator.export_images(&mut presentation, &self.paths.slides_dir(&script.title))?;
        Ok(presentation)
    }

    /// Synthesize narration for every scene.
    pub async fn narration(
        &self,
        script: &Script,
        output_dir: Option<&Path>,
        provider: Option<TtsProviderKind>,
    ) -> Result<(Vec<AudioSegment>, PathBuf)> {
        let dir = output_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.paths.audio_dir(&script.title));
        let generator = self.tts_generator(provider)?;
        let segments = generator.generate_for_script(script, &dir).await?;
        Ok((segments, dir))
    }

    /// Reuse narration already in `dir` and synthesize only what is missing.
    pub async fn ensure_narration(
        &self,
        script: &Script,
        dir: &Path,
        provider: Option<TtsProviderKind>,
    ) -> Result<Vec<AudioSegment>> {
        let mut segments = load_segments(script, dir)?;
        if segments.len() == script.scenes.len() {
            return Ok(segments);
        }

        let generator = self.tts_generator(provider)?;
        for scene in &script.scenes {
            if segments.iter().any(|s| s.scene_id == scene.id) {
                continue;
            }
            if ctrlc_received() {
                return Err(SynthesisError::Interrupted.into());
            }
            log::info!("Narration for scene {} missing, synthesizing", scene.id);
            segments.push(generator.generate_for_scene(scene, dir).await?);
        }

        let order = |id: u32| script.scenes.iter().position(|s| s.id == id);
        segments.sort_by_key(|s| order(s.scene_id));
        Ok(segments)
    }

    pub fn sync(
        &self,
        script: &Script,
        presentation: &Presentation,
        segments: &[AudioSegment],
    ) -> Result<TimingManifest> {
        let service = SyncService::from_settings(&self.settings.video);
        Ok(service.build(script, presentation, segments)?)
    }

    /// Encode the final video. The timing manifest lands next to it.
    pub fn video(
        &self,
        presentation: &Presentation,
        manifest: &TimingManifest,
        output: &Path,
        transitions: bool,
    ) -> Result<PathBuf> {
        let mut generator = VideoGenerator::new(self.settings.video.clone())
            .with_transitions(transitions)
            .keep_intermediate(self.settings.output.keep_intermediate);
        if let Some(program) = &self.ffmpeg {
            generator = generator.with_program(program.clone());
        }
        Ok(generator.generate(presentation, manifest, output)?)
    }

    /// Script file to finished video: reuses or builds the deck and
    /// narration, then syncs and encodes.
    pub async fn video_from_script(
        &self,
        script_path: &Path,
        deck: Option<&Path>,
        audio_dir: Option<&Path>,
        output: Option<&Path>,
        transitions: bool,
    ) -> Result<PathBuf> {
        let script = self.load_script(script_path)?;

        let default_deck = self.paths.presentation(&script.title);
        let presentation = match deck {
            Some(path) => self.load_presentation(path, &script)?,
            None if default_deck.exists() => self.load_presentation(&default_deck, &script)?,
            None => self.presentation(&script, None)?,
        };

        let audio_dir = audio_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.paths.audio_dir(&script.title));
        let segments = self.ensure_narration(&script, &audio_dir, None).await?;

        let manifest = self.sync(&script, &presentation, &segments)?;
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.paths.video(&script.title));
        self.video(&presentation, &manifest, &output, transitions)
    }

    async fn youtube(&self) -> Result<YouTubeService> {
        let authenticator = Authenticator::new(&self.settings.youtube, &self.settings.keys)?;
        Ok(YouTubeService::connect(self.settings.youtube.clone(), &authenticator).await?)
    }

    pub async fn upload(&self, request: &UploadRequest) -> Result<UploadedVideo> {
        if !request.video_path.is_file() {
            return Err(crate::youtube::UploadError::VideoNotFound(request.video_path.clone()).into());
        }
        let service = self.youtube().await?;
        Ok(service.upload(request).await?)
    }

    pub async fn status(&self, video_id: &str) -> Result<Option<VideoStatus>> {
        let service = self.youtube().await?;
        Ok(service.check_upload_status(video_id).await?)
    }

    /// Run every stage, writing each artifact where its stage command would.
    pub async fn generate(&self, options: &GenerateOptions) -> Result<GenerateOutcome> {
        println!("[1/5] Generating script...");
        let (script, script_path) = self
            .script(&options.input, options.ai_provider, options.use_cache, None)
            .await?;
        println!("  {} ({} scenes)", script.title, script.scenes.len());

        println!("[2/5] Building presentation...");
        let presentation = self.presentation(&script, None)?;
        let presentation_path = self.paths.presentation(&script.title);

        println!("[3/5] Synthesizing narration...");
        let (segments, audio_dir) = self.narration(&script, None, options.tts_provider).await?;

        println!("[4/5] Syncing and encoding video...");
        let manifest = self.sync(&script, &presentation, &segments)?;
        let video_path = self.video(
            &presentation,
            &manifest,
            &self.paths.video(&script.title),
            options.transitions,
        )?;

        let uploaded = if options.upload {
            println!("[5/5] Uploading to YouTube...");
            let mut request = UploadRequest::new(video_path.clone(), script.title.clone());
            request.description = script.description.clone();
            request.tags = script.tags.clone();
            request.privacy = options.privacy;
            Some(self.upload(&request).await?)
        } else {
            println!("[5/5] Upload skipped");
            None
        };

        Ok(GenerateOutcome {
            script_path,
            presentation_path,
            audio_dir,
            manifest_path: manifest_path(&video_path),
            video_path,
            uploaded,
        })
    }
}
