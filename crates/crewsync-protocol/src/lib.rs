//! Wire protocol for crewsync.
//!
//! - **Types** ([`BattleId`], [`PlayerId`], [`Difficulty`], [`ErrorCode`],
//!   [`Recipient`]): the vocabulary every layer shares.
//! - **Events** ([`ClientEvent`], [`ServerEvent`], [`AckFrame`]): what
//!   travels in each frame.
//! - **Codec** ([`Codec`], [`JsonCodec`]): bytes to frames and back.
//!
//! The protocol layer knows nothing about rooms or timers. It sits between
//! the transport (raw frames) and the engine (battle actions).

mod codec;
mod error;
mod events;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use events::{
    coerce_number, AckBody, AckFrame, Attack, Attacked, BattleSnapshot,
    BroadcastState, ClientEvent, CompleteRound, Eliminated, ErrorBody,
    InvitationIssued, InvitationResponse, JoinBattle, MatchStarted,
    PlayerJoined, PlayerLeft, PlayerView, RawFrame, ReportScore,
    RespondSyncInvitation, RoundStarted, ServerEvent, ServerFrame,
    StartSyncInvitation, TaskAnnounced, Winner,
};
pub use types::{
    BattleId, Difficulty, ErrorCode, PlayerId, Recipient, UnknownDifficulty,
};
