use serde::{Deserialize, Serialize};

use crate::{error::PlaybackError, visibility::InputKind};

use super::{controller::SessionController, state::PlaybackSnapshot};

/// Intents the UI can issue. The UI never edits session fields directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayerCommand {
    Play,
    Pause,
    TogglePlay,
    Seek { seconds: f64 },
    SkipForward,
    SkipBack,
    SetVolume { volume: u8 },
    ToggleMute,
    SetRate { rate: f64 },
    ToggleFullscreen,
    StartSleepTimer { minutes: u32 },
    CancelSleepTimer,
    UserActivity { kind: InputKind },
}

pub async fn dispatch(
    controller: &SessionController,
    command: PlayerCommand,
) -> Result<PlaybackSnapshot, PlaybackError> {
    match command {
        PlayerCommand::Play => controller.play().await?,
        PlayerCommand::Pause => controller.pause().await?,
        PlayerCommand::TogglePlay => controller.toggle_play().await?,
        PlayerCommand::Seek { seconds } => controller.seek(seconds).await?,
        PlayerCommand::SkipForward => controller.skip_forward().await?,
        PlayerCommand::SkipBack => controller.skip_back().await?,
        PlayerCommand::SetVolume { volume } => controller.set_volume(volume).await?,
        PlayerCommand::ToggleMute => {
            controller.toggle_mute().await?;
        }
        PlayerCommand::SetRate { rate } => controller.set_rate(rate).await?,
        PlayerCommand::ToggleFullscreen => {
            controller.toggle_fullscreen().await?;
        }
        PlayerCommand::StartSleepTimer { minutes } => controller.start_sleep_timer(minutes).await?,
        PlayerCommand::CancelSleepTimer => controller.cancel_sleep_timer().await?,
        PlayerCommand::UserActivity { kind } => controller.on_user_activity(kind).await?,
    }

    controller.snapshot().await
}
