use anyhow::anyhow;

use crate::entropy::Entropy;
use crate::model::{DECLINE_TEASE_TEXTS, InvitationShare, Message};

pub const DECLINE_HINT: &str = "No escape button detected. Accept it already 💘";

/// Horizontal and vertical nudge applied to the decline button.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Offset {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Accepted,
    Dismissed,
}

/// Lifecycle of an invitation received from the partner:
/// idle, envelope shown, card opened (declining only teases), resolved.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum IncomingInvitation {
    #[default]
    Idle,
    Envelope {
        message: Message,
    },
    CardOpened {
        message: Message,
        decline_attempts: u32,
        offset: Offset,
    },
    Resolved {
        message: Message,
        resolution: Resolution,
    },
}

impl IncomingInvitation {
    /// Shows `message` as a fresh envelope. A new invitation replaces
    /// whatever was on screen, resetting the tease state.
    pub fn present(message: Message) -> Self {
        IncomingInvitation::Envelope { message }
    }

    pub fn name(&self) -> &'static str {
        match self {
            IncomingInvitation::Idle => "idle",
            IncomingInvitation::Envelope { .. } => "envelope",
            IncomingInvitation::CardOpened { .. } => "card-opened",
            IncomingInvitation::Resolved { .. } => "resolved",
        }
    }

    pub fn message(&self) -> Option<&Message> {
        match self {
            IncomingInvitation::Idle => None,
            IncomingInvitation::Envelope { message }
            | IncomingInvitation::CardOpened { message, .. }
            | IncomingInvitation::Resolved { message, .. } => Some(message),
        }
    }

    pub fn share(&self) -> Option<&InvitationShare> {
        self.message().and_then(|message| message.invitation.as_ref())
    }

    pub fn open(self) -> anyhow::Result<Self> {
        match self {
            IncomingInvitation::Envelope { message } => Ok(IncomingInvitation::CardOpened {
                message,
                decline_attempts: 0,
                offset: Offset::default(),
            }),
            other => Err(invalid_transition(&other, "open")),
        }
    }

    /// Declining never resolves the card; it counts the attempt and moves
    /// the button somewhere else.
    pub fn tease_decline(&mut self, entropy: &mut dyn Entropy) -> anyhow::Result<()> {
        match self {
            IncomingInvitation::CardOpened {
                decline_attempts,
                offset,
                ..
            } => {
                *decline_attempts = decline_attempts.saturating_add(1);
                *offset = Offset {
                    x: ((entropy.next_unit() - 0.5) * 140.0).round() as i32,
                    y: ((entropy.next_unit() - 0.5) * 60.0).round() as i32,
                };
                Ok(())
            }
            other => Err(invalid_transition(other, "decline")),
        }
    }

    pub fn accept(self) -> anyhow::Result<Self> {
        match self {
            IncomingInvitation::CardOpened { message, .. } => Ok(IncomingInvitation::Resolved {
                message,
                resolution: Resolution::Accepted,
            }),
            other => Err(invalid_transition(&other, "accept")),
        }
    }

    pub fn dismiss(self) -> anyhow::Result<Self> {
        match self {
            IncomingInvitation::Envelope { message }
            | IncomingInvitation::CardOpened { message, .. } => Ok(IncomingInvitation::Resolved {
                message,
                resolution: Resolution::Dismissed,
            }),
            other => Err(invalid_transition(&other, "dismiss")),
        }
    }

    pub fn decline_attempts(&self) -> u32 {
        match self {
            IncomingInvitation::CardOpened {
                decline_attempts, ..
            } => *decline_attempts,
            _ => 0,
        }
    }

    pub fn decline_label(&self) -> &'static str {
        let index = (self.decline_attempts() as usize).min(DECLINE_TEASE_TEXTS.len() - 1);
        DECLINE_TEASE_TEXTS[index]
    }

    pub fn decline_hint(&self) -> Option<&'static str> {
        (self.decline_attempts() > 0).then_some(DECLINE_HINT)
    }
}

fn invalid_transition(state: &IncomingInvitation, action: &str) -> anyhow::Error {
    anyhow!("cannot {action} an invitation in state {}", state.name())
}
