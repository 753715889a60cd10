use std::process;
use std::time::{Duration, Instant};

use framesink::backend::{EncoderKind, Ffmpeg};
use framesink::config::Config;
use framesink::pipeline::{FrameStatus, SessionConfig, VideoOutputSession};
use framesink::preview::{ChannelConfig, PreviewProducer, PreviewReader};
use rand::Rng;
use serde::Serialize;

use crate::cli::{Cli, Commands};

pub fn run(cli: Cli) {
    let json = cli.json;
    match cli.command {
        Commands::CheckFfmpeg => handle_check_ffmpeg(),
        Commands::Record {
            output,
            width,
            height,
            fps,
            frames,
            encoder,
            preview,
        } => handle_record(output, width, height, fps, frames, &encoder, preview, json),
        Commands::Watch {
            name,
            max_width,
            max_height,
            interval_ms,
        } => handle_watch(&name, max_width, max_height, interval_ms, json),
    }
}

fn ffmpeg_handle() -> Ffmpeg {
    let config = Config::load().unwrap_or_default();
    match config.defaults.ffmpeg_path {
        Some(path) => Ffmpeg::new(path),
        None => Ffmpeg::from_path_env(),
    }
}

fn handle_check_ffmpeg() {
    match ffmpeg_handle().version() {
        Ok(version) => {
            println!("ffmpeg found: {}", version);
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}

#[derive(Debug, Serialize)]
struct RecordSummary {
    output: String,
    frames_accepted: u64,
    completed: u64,
    failed: u64,
    elapsed_ms: u128,
    preview_channel: Option<String>,
}

#[allow(clippy::too_many_arguments)]
fn handle_record(
    output: std::path::PathBuf,
    width: u32,
    height: u32,
    fps: u32,
    frames: u32,
    encoder: &str,
    preview: Option<String>,
    json: bool,
) {
    let kind = match EncoderKind::from_name(encoder) {
        Ok(kind) => kind,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let defaults = Config::load().unwrap_or_default().defaults;
    let mut config = SessionConfig::new(width, height, fps, kind, output.clone());
    config.queue_capacity = defaults.queue_capacity;
    config.backpressure = defaults.backpressure;

    let mut session = match VideoOutputSession::open(&ffmpeg_handle(), config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Error opening session: {}", e);
            process::exit(1);
        }
    };

    let preview_name = preview.and_then(|name| {
        let channel = ChannelConfig {
            slot_count: defaults.preview_slots,
            max_width: width,
            max_height: height,
        };
        match PreviewProducer::create(Some(&name), channel) {
            Ok(producer) => {
                let name = producer.name().to_string();
                println!("Preview channel: {}", name);
                session.attach_preview(producer);
                Some(name)
            }
            Err(e) => {
                eprintln!("Warning: could not create preview channel: {}", e);
                None
            }
        }
    });

    let start = Instant::now();
    let mut completed = 0u64;
    let mut failed = 0u64;
    let phase: u32 = rand::thread_rng().gen_range(0..255);

    for n in 0..frames {
        let data = gradient_frame(width, height, phase.wrapping_add(n));
        if let Err(e) = session.write(data, width, height) {
            eprintln!("Error writing frame {}: {}", n, e);
            break;
        }
        for record in session.check_completed() {
            match record.status {
                FrameStatus::Completed => completed += 1,
                FrameStatus::Failed(reason) => {
                    eprintln!("frame {} failed: {}", record.frame_id, reason);
                    failed += 1;
                }
                FrameStatus::Pending => {}
            }
        }
    }

    let accepted = session.accepted();
    let close_result = session.close();
    for record in session.check_completed() {
        match record.status {
            FrameStatus::Completed => completed += 1,
            FrameStatus::Failed(reason) => {
                eprintln!("frame {} failed: {}", record.frame_id, reason);
                failed += 1;
            }
            FrameStatus::Pending => {}
        }
    }

    let summary = RecordSummary {
        output: output.display().to_string(),
        frames_accepted: accepted,
        completed,
        failed,
        elapsed_ms: start.elapsed().as_millis(),
        preview_channel: preview_name,
    };

    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Error serializing summary: {}", e),
        }
    } else {
        println!(
            "Encoded {} frames ({} completed, {} failed) to {} in {} ms",
            summary.frames_accepted,
            summary.completed,
            summary.failed,
            summary.output,
            summary.elapsed_ms
        );
    }

    if let Err(e) = close_result {
        eprintln!("Error closing session: {}", e);
        process::exit(1);
    }
    if failed > 0 {
        process::exit(1);
    }
}

#[derive(Debug, Serialize)]
struct WatchSummary {
    frames_seen: u64,
    frames_dropped: u64,
}

fn handle_watch(name: &str, max_width: u32, max_height: u32, interval_ms: u64, json: bool) {
    let mut reader = match PreviewReader::open(name) {
        Ok(reader) => reader,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let mut seen = 0u64;
    loop {
        match reader.read(max_width, max_height) {
            Ok(Some(frame)) => {
                seen += 1;
                if !json {
                    println!(
                        "frame {} ({}x{}, {} bytes, {} dropped so far)",
                        frame.frame_index,
                        frame.width,
                        frame.height,
                        frame.data.len(),
                        reader.dropped()
                    );
                }
            }
            Ok(None) => std::thread::sleep(Duration::from_millis(interval_ms)),
            Err(e) => {
                if !json {
                    println!("channel ended: {}", e);
                }
                break;
            }
        }
    }

    let summary = WatchSummary {
        frames_seen: seen,
        frames_dropped: reader.dropped(),
    };
    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("Error serializing summary: {}", e),
        }
    } else {
        println!(
            "Watched {} frames, {} dropped",
            summary.frames_seen, summary.frames_dropped
        );
    }
}

// Moving BGRA gradient, the classic encoder test pattern.
fn gradient_frame(width: u32, height: u32, phase: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(width as usize * height as usize * 4);
    for y in 0..height {
        for x in 0..width {
            let t = phase + x + y;
            data.push((t % 255) as u8); // B
            data.push(((t + 64) % 255) as u8); // G
            data.push(((t + 128) % 255) as u8); // R
            data.push(255); // A
        }
    }
    data
}
