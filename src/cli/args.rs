//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::enums::{AiProvider, Privacy, TtsProvider};

/// Turn a topic into a narrated slide video and publish it to YouTube
#[derive(Parser, Debug)]
#[command(name = "contents-autouploader")]
#[command(version, about = "Script, slides, narration and video from a topic", long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a lecture script
    Script {
        /// Lecture topic
        #[arg(short, long)]
        topic: String,

        /// Storyline, e.g. "문제점 → 해결책 → 실천"
        #[arg(short, long)]
        storyline: String,

        /// Target length in minutes (default: script.default_duration)
        #[arg(short, long)]
        duration: Option<u32>,

        /// Tone of voice (default: script.default_tone)
        #[arg(long)]
        tone: Option<String>,

        /// Output JSON path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// LLM provider (default: ai.provider)
        #[arg(long)]
        provider: Option<AiProvider>,

        /// Ignore cached LLM responses
        #[arg(long)]
        no_cache: bool,
    },

    /// Build a presentation from a script
    Ppt {
        /// Script JSON file
        #[arg(short, long)]
        script: PathBuf,

        /// Output .pptx path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Synthesize narration for every scene
    Tts {
        /// Script JSON file
        #[arg(short, long)]
        script: PathBuf,

        /// Directory for the audio files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// TTS provider (default: tts.provider)
        #[arg(short, long)]
        provider: Option<TtsProvider>,
    },

    /// Assemble the final video
    Video {
        /// Script JSON file
        #[arg(short, long)]
        script: PathBuf,

        /// Existing .pptx (built from the script when omitted)
        #[arg(short, long)]
        ppt: Option<PathBuf>,

        /// Directory with section_NNN audio files
        #[arg(short, long)]
        audio_dir: Option<PathBuf>,

        /// Output .mp4 path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Hard cuts between slides
        #[arg(long)]
        no_transitions: bool,
    },

    /// Upload a video to YouTube
    Upload {
        /// Video file
        #[arg(short, long)]
        video: PathBuf,

        /// Video title (default: file name)
        #[arg(short, long)]
        title: Option<String>,

        /// Video description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Comma-separated tags (default: youtube.default_tags)
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,

        /// Privacy status (default: youtube.privacy_status)
        #[arg(long)]
        privacy: Option<Privacy>,

        /// Thumbnail image
        #[arg(long)]
        thumbnail: Option<PathBuf>,
    },

    /// Run every step from topic to video
    Generate {
        /// Lecture topic
        #[arg(short, long)]
        topic: String,

        /// Storyline, e.g. "문제점 → 해결책 → 실천"
        #[arg(short, long)]
        storyline: String,

        /// Target length in minutes
        #[arg(short, long)]
        duration: Option<u32>,

        /// Tone of voice
        #[arg(long)]
        tone: Option<String>,

        /// Upload the finished video
        #[arg(long)]
        upload: bool,

        /// Privacy status for the upload
        #[arg(long)]
        privacy: Option<Privacy>,
    },

    /// Show the processing status of an uploaded video
    Status {
        /// YouTube video id
        #[arg(long)]
        video_id: String,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_command() {
        let cli = Cli::parse_from([
            "contents-autouploader",
            "script",
            "-t",
            "시간 관리의 중요성",
            "-s",
            "문제점 → 해결책 → 실천",
            "-d",
            "5",
            "--provider",
            "ollama",
            "--no-cache",
        ]);
        match cli.command {
            Command::Script {
                topic,
                storyline,
                duration,
                provider,
                no_cache,
                output,
                tone,
            } => {
                assert_eq!(topic, "시간 관리의 중요성");
                assert_eq!(storyline, "문제점 → 해결책 → 실천");
                assert_eq!(duration, Some(5));
                assert_eq!(provider, Some(AiProvider::Ollama));
                assert!(no_cache);
                assert!(output.is_none());
                assert!(tone.is_none());
            }
            other => panic!("Expected Script subcommand, got {:?}", other),
        }
    }

    #[test]
    fn test_script_requires_topic() {
        let result = Cli::try_parse_from(["contents-autouploader", "script", "-s", "a → b"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_config_option() {
        let cli = Cli::parse_from([
            "contents-autouploader",
            "ppt",
            "-s",
            "script.json",
            "-c",
            "/tmp/config.yaml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.yaml")));
        assert!(matches!(cli.command, Command::Ppt { output: None, .. }));
    }

    #[test]
    fn test_tts_provider_flag() {
        let cli = Cli::parse_from([
            "contents-autouploader",
            "tts",
            "-s",
            "script.json",
            "-p",
            "elevenlabs",
        ]);
        match cli.command {
            Command::Tts { provider, .. } => assert_eq!(provider, Some(TtsProvider::Elevenlabs)),
            other => panic!("Expected Tts subcommand, got {:?}", other),
        }
    }

    #[test]
    fn test_video_flags() {
        let cli = Cli::parse_from([
            "contents-autouploader",
            "video",
            "-s",
            "script.json",
            "-p",
            "deck.pptx",
            "-a",
            "audio",
            "--no-transitions",
        ]);
        match cli.command {
            Command::Video {
                ppt,
                audio_dir,
                no_transitions,
                ..
            } => {
                assert_eq!(ppt, Some(PathBuf::from("deck.pptx")));
                assert_eq!(audio_dir, Some(PathBuf::from("audio")));
                assert!(no_transitions);
            }
            other => panic!("Expected Video subcommand, got {:?}", other),
        }
    }

    #[test]
    fn test_upload_tags_are_split() {
        let cli = Cli::parse_from([
            "contents-autouploader",
            "upload",
            "-v",
            "out.mp4",
            "--tags",
            "교육,강의",
            "--privacy",
            "unlisted",
        ]);
        match cli.command {
            Command::Upload {
                tags,
                privacy,
                title,
                description,
                ..
            } => {
                assert_eq!(tags, vec!["교육", "강의"]);
                assert_eq!(privacy, Some(Privacy::Unlisted));
                assert!(title.is_none());
                assert_eq!(description, "");
            }
            other => panic!("Expected Upload subcommand, got {:?}", other),
        }
    }

    #[test]
    fn test_generate_and_status() {
        let cli = Cli::parse_from([
            "contents-autouploader",
            "generate",
            "--topic",
            "t",
            "--storyline",
            "a → b",
            "--upload",
        ]);
        assert!(matches!(cli.command, Command::Generate { upload: true, .. }));

        let cli = Cli::parse_from(["contents-autouploader", "status", "--video-id", "abc"]);
        assert!(matches!(cli.command, Command::Status { video_id } if video_id == "abc"));
    }

    #[test]
    fn test_config_subcommands() {
        let cli = Cli::parse_from(["contents-autouploader", "config", "show"]);
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Show
            }
        ));
        let cli = Cli::parse_from(["contents-autouploader", "config", "init"]);
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Init
            }
        ));
    }
}
