//! Subcommand handlers.

use std::path::Path;

use super::args::{Cli, Command, ConfigAction};
use crate::config::{self, Settings};
use crate::models::ScriptInput;
use crate::util::format_duration;
use crate::workflow::{GenerateOptions, Workflow};
use crate::youtube::UploadRequest;
use crate::Result;

fn runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Runtime::new()?)
}

fn script_input(
    settings: &Settings,
    topic: String,
    storyline: String,
    duration: Option<u32>,
    tone: Option<String>,
) -> ScriptInput {
    let mut input = ScriptInput::new(topic, storyline)
        .with_duration(duration.unwrap_or(settings.script.default_duration))
        .with_tone(tone.unwrap_or_else(|| settings.script.default_tone.clone()));
    input.language = settings.script.language.clone();
    input
}

/// Run a parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return handle_config_action(action.clone(), cli.config.as_deref());
    }

    let settings = Settings::load(cli.config.as_deref())?;
    let workflow = Workflow::new(settings);

    match cli.command {
        Command::Script {
            topic,
            storyline,
            duration,
            tone,
            output,
            provider,
            no_cache,
        } => {
            let input = script_input(workflow.settings(), topic, storyline, duration, tone);
            let (script, path) = runtime()?.block_on(workflow.script(
                &input,
                provider.map(Into::into),
                !no_cache,
                output.as_deref(),
            ))?;

            println!("Script: {}", script.title);
            for scene in &script.scenes {
                println!(
                    "  {}. {} (~{})",
                    scene.id,
                    scene.title,
                    format_duration(scene.estimated_duration_sec)
                );
            }
            println!("Total: ~{}", format_duration(script.total_duration_sec));
            println!("Saved to {}", path.display());
        }

        Command::Ppt { script, output } => {
            let script = workflow.load_script(&script)?;
            let presentation = workflow.presentation(&script, output.as_deref())?;
            let path = presentation
                .file_path
                .as_deref()
                .unwrap_or_else(|| Path::new(""));
            println!(
                "Presentation saved: {} ({} slides)",
                path.display(),
                presentation.slide_count()
            );
        }

        Command::Tts {
            script,
            output_dir,
            provider,
        } => {
            let script = workflow.load_script(&script)?;
            let (segments, dir) = runtime()?.block_on(workflow.narration(
                &script,
                output_dir.as_deref(),
                provider.map(Into::into),
            ))?;

            let total: f64 = segments.iter().map(|s| s.duration).sum();
            println!(
                "Generated {} audio files in {} ({})",
                segments.len(),
                dir.display(),
                format_duration(total)
            );
        }

        Command::Video {
            script,
            ppt,
            audio_dir,
            output,
            no_transitions,
        } => {
            let video = runtime()?.block_on(workflow.video_from_script(
                &script,
                ppt.as_deref(),
                audio_dir.as_deref(),
                output.as_deref(),
                !no_transitions,
            ))?;
            println!("Video saved: {}", video.display());
        }

        Command::Upload {
            video,
            title,
            description,
            tags,
            privacy,
            thumbnail,
        } => {
            let title = title.unwrap_or_else(|| {
                video
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let mut request = UploadRequest::new(video, title);
            request.description = description;
            request.tags = tags.into_iter().filter(|t| !t.trim().is_empty()).collect();
            request.privacy = privacy.map(Into::into);
            request.thumbnail = thumbnail;

            let uploaded = runtime()?.block_on(workflow.upload(&request))?;
            println!("Video ID: {}", uploaded.id);
            println!("URL: {}", uploaded.url);
        }

        Command::Generate {
            topic,
            storyline,
            duration,
            tone,
            upload,
            privacy,
        } => {
            let input = script_input(workflow.settings(), topic, storyline, duration, tone);
            let mut options = GenerateOptions::new(input);
            options.upload = upload;
            options.privacy = privacy.map(Into::into);

            let outcome = runtime()?.block_on(workflow.generate(&options))?;
            println!();
            println!("Script:       {}", outcome.script_path.display());
            println!("Presentation: {}", outcome.presentation_path.display());
            println!("Audio:        {}", outcome.audio_dir.display());
            println!("Timing:       {}", outcome.manifest_path.display());
            println!("Video:        {}", outcome.video_path.display());
            if let Some(uploaded) = outcome.uploaded {
                println!("YouTube:      {}", uploaded.url);
            }
        }

        Command::Status { video_id } => {
            match runtime()?.block_on(workflow.status(&video_id))? {
                Some(status) => {
                    let show = |v: Option<String>| v.unwrap_or_else(|| "unknown".to_string());
                    println!("Upload status:     {}", show(status.upload_status));
                    println!("Privacy status:    {}", show(status.privacy_status));
                    println!("Processing status: {}", show(status.processing_status));
                }
                None => println!("Video not found: {}", video_id),
            }
        }

        Command::Config { .. } => {}
    }

    Ok(())
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, explicit: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let settings = Settings::load(explicit)?;
            println!("Current configuration:");
            println!();
            print!("{}", settings.to_yaml()?);
            println!();
            println!("API keys: {:?}", settings.keys);
            println!();

            let config_path = explicit
                .map(Path::to_path_buf)
                .or_else(|| config::search_paths().into_iter().find(|p| p.exists()));
            match config_path {
                Some(path) => println!("Config file: {} (exists)", path.display()),
                None => println!(
                    "Config file: {} (not found, using defaults)",
                    config::default_path().display()
                ),
            }
        }
        ConfigAction::Init => {
            let config_path = explicit
                .map(Path::to_path_buf)
                .unwrap_or_else(config::default_path);
            config::write_default_config(&config_path)?;
            println!("Created config file: {}", config_path.display());
        }
    }
    Ok(())
}
