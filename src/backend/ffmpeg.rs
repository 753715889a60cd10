// FFMPEG subprocess backend: raw frames are streamed to the child's
// stdin and muxed by ffmpeg into the session's output container.

use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::pipeline::{Frame, SessionConfig};

use super::{BackendError, EncoderBackend, EncoderKind};

/// Explicit handle to the ffmpeg executable.
///
/// There is no global "initialized" flag: callers construct one of
/// these once and thread it through every `open`, which also pins the
/// executable a session uses for its whole lifetime.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    executable: PathBuf,
}

impl Ffmpeg {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Resolve `ffmpeg` through PATH.
    pub fn from_path_env() -> Self {
        Self::new("ffmpeg")
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Check that the executable runs and return its version line.
    pub fn version(&self) -> Result<String> {
        let output = Command::new(&self.executable)
            .arg("-version")
            .output()
            .with_context(|| {
                format!(
                    "Failed to execute '{}'. Is ffmpeg installed and in PATH?",
                    self.executable.display()
                )
            })?;

        if !output.status.success() {
            anyhow::bail!("ffmpeg command failed with status: {}", output.status);
        }

        let version_output = String::from_utf8_lossy(&output.stdout);
        let first_line = version_output.lines().next().unwrap_or("Unknown version");
        Ok(first_line.to_string())
    }

    /// Spawn an encoder child process wired for the given session.
    pub fn spawn_encoder(&self, config: &SessionConfig) -> io::Result<FfmpegBackend> {
        let mut cmd = build_encode_cmd(&self.executable, config);
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("ffmpeg stdin was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("ffmpeg stderr was not captured"))?;

        // Drain stderr on its own thread so a chatty child can never
        // deadlock against our frame writes.
        let stderr_thread = std::thread::spawn(move || {
            let mut output = String::new();
            let reader = BufReader::new(stderr);
            for line in reader.lines().map_while(Result::ok) {
                output.push_str(&line);
                output.push('\n');
            }
            output
        });

        debug!(pid = child.id(), output = %config.output_path.display(), "spawned ffmpeg encoder");
        Ok(FfmpegBackend {
            child,
            stdin: Some(stdin),
            stderr_thread: Some(stderr_thread),
        })
    }
}

/// The ffmpeg invocation for a session: rawvideo frames on stdin, one
/// encoded output file.
pub fn build_encode_cmd(executable: &Path, config: &SessionConfig) -> Command {
    let mut cmd = Command::new(executable);

    // Input: packed raw frames, dimensions and rate fixed by the session.
    cmd.arg("-f").arg("rawvideo");
    cmd.arg("-pix_fmt").arg(config.pixel_format.to_string());
    cmd.arg("-video_size")
        .arg(format!("{}x{}", config.width, config.height));
    cmd.arg("-framerate").arg(config.fps.to_string());
    cmd.arg("-i").arg("pipe:0");

    // Output: the session's codec, yuv420p for player compatibility.
    cmd.arg("-c:v").arg(config.encoder.codec_arg());
    if config.encoder == EncoderKind::H264 {
        cmd.arg("-profile:v").arg("high");
    }
    cmd.arg("-pix_fmt").arg("yuv420p");
    cmd.arg("-y").arg(&config.output_path);

    cmd
}

/// Live encoder process for one session.
pub struct FfmpegBackend {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_thread: Option<JoinHandle<String>>,
}

impl FfmpegBackend {
    fn stderr_tail(&mut self) -> String {
        let output = self
            .stderr_thread
            .take()
            .and_then(|t| t.join().ok())
            .unwrap_or_default();
        // Keep the last few lines; ffmpeg's banner is noise.
        let lines: Vec<&str> = output.lines().rev().take(6).collect();
        lines.into_iter().rev().collect::<Vec<_>>().join("\n")
    }
}

impl EncoderBackend for FfmpegBackend {
    fn encode(&mut self, frame: &Frame) -> Result<(), BackendError> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(BackendError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "encoder stdin already closed",
            )));
        };
        // A write failure means the child died or the output became
        // unwritable — fatal for the session either way.
        stdin.write_all(&frame.data)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), BackendError> {
        // EOF on stdin tells ffmpeg to flush and write the trailer.
        drop(self.stdin.take());
        let status = self.child.wait()?;
        let stderr = self.stderr_tail();
        if status.success() {
            debug!("ffmpeg encoder exited cleanly");
            Ok(())
        } else {
            Err(BackendError::Io(io::Error::other(format!(
                "ffmpeg exited with {status}: {stderr}"
            ))))
        }
    }
}

impl Drop for FfmpegBackend {
    fn drop(&mut self) {
        drop(self.stdin.take());
        match self.child.try_wait() {
            Ok(Some(_)) => {}
            _ => {
                // Unfinished child: reap it rather than leak a zombie.
                if let Err(e) = self.child.kill() {
                    warn!(error = %e, "could not kill ffmpeg child");
                }
                let _ = self.child.wait();
            }
        }
        if let Some(t) = self.stderr_thread.take() {
            let _ = t.join();
        }
    }
}
