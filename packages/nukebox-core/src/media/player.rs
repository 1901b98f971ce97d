//! Audio playback through an external player process.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::error::PlayerError;

/// Plays one file at a time.
#[async_trait]
pub trait Player: Send + Sync {
    /// Starts playing `path`, replacing anything already playing.
    async fn play(&self, path: &Path) -> Result<(), PlayerError>;

    /// Returns `true` while the last started track is still playing.
    async fn is_playing(&self) -> bool;

    /// Stops playback and releases the player.
    async fn shutdown(&self);
}

/// [`Player`] that runs a command per track, e.g. `ffplay -nodisp -autoexit`.
///
/// The track path is appended as the last argument. The track is considered
/// playing for as long as the child process is alive.
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl CommandPlayer {
    /// Builds a player from `program` followed by its arguments.
    pub fn new(command: &[String]) -> Result<Self, PlayerError> {
        let (program, args) = command.split_first().ok_or(PlayerError::NoCommand)?;
        if program.is_empty() {
            return Err(PlayerError::NoCommand);
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            child: Mutex::new(None),
        })
    }
}

#[async_trait]
impl Player for CommandPlayer {
    async fn play(&self, path: &Path) -> Result<(), PlayerError> {
        let mut slot = self.child.lock().await;
        if let Some(mut previous) = slot.take() {
            if let Err(e) = previous.kill().await {
                log::warn!("[Player] Failed to stop previous track: {}", e);
            }
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(PlayerError::Spawn)?;

        log::info!(
            "[Player] Started {} (pid {:?})",
            path.display(),
            child.id()
        );
        *slot = Some(child);
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        let mut slot = self.child.lock().await;
        let Some(child) = slot.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                log::debug!("[Player] Player exited with {}", status);
                *slot = None;
                false
            }
            Err(e) => {
                log::warn!("[Player] Failed to poll player: {}", e);
                *slot = None;
                false
            }
        }
    }

    async fn shutdown(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            match child.kill().await {
                Ok(()) => log::info!("[Player] Stopped playback"),
                Err(e) => log::warn!("[Player] Failed to stop player: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn command(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(matches!(
            CommandPlayer::new(&[]),
            Err(PlayerError::NoCommand)
        ));
        assert!(matches!(
            CommandPlayer::new(&command(&[""])),
            Err(PlayerError::NoCommand)
        ));
    }

    #[tokio::test]
    async fn missing_program_fails_to_spawn() {
        let player = CommandPlayer::new(&command(&["nukebox-no-such-player"])).unwrap();
        assert!(matches!(
            player.play(Path::new("track.mp3")).await,
            Err(PlayerError::Spawn(_))
        ));
        assert!(!player.is_playing().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn playing_follows_the_child_process() {
        // `sleep <path>` stands in for a player; the "path" is the duration.
        let player = CommandPlayer::new(&command(&["sleep"])).unwrap();
        player.play(Path::new("0.2")).await.unwrap();
        assert!(player.is_playing().await);

        let mut finished = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if !player.is_playing().await {
                finished = true;
                break;
            }
        }
        assert!(finished);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shutdown_kills_the_player() {
        let player = CommandPlayer::new(&command(&["sleep"])).unwrap();
        player.play(Path::new("30")).await.unwrap();
        assert!(player.is_playing().await);

        player.shutdown().await;
        assert!(!player.is_playing().await);
    }
}
