//! Wire protocol for LearnLoop.
//!
//! This crate defines the "language" that quiz clients and the server speak:
//!
//! - **Content** ([`Quiz`], [`Question`], [`Answer`]): the quiz catalog's
//!   data model, also embedded in outbound messages.
//! - **Messages** ([`Envelope`], [`ServerMessage`], the per-kind structs):
//!   the JSON objects that travel in WebSocket text frames.
//! - **Commands** ([`Command`]): the closed set of things a client can ask
//!   for, decoded in two phases from an inbound frame.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become text.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw frames) and the quiz
//! engine. It knows nothing about connections or sessions; it only turns
//! bytes into typed values and back.
//!
//! ```text
//! Transport (bytes) → Protocol (Command) → Dispatch → Engine
//! Engine → ServerMessage → Protocol (text) → Transport
//! ```
//!
//! # Integer enums
//!
//! Every enum on the wire is a bare integer (`"type": 4`, `"correct": -1`),
//! so the enums here implement `Serialize`/`Deserialize` by hand through
//! the `wire_enum!` macro instead of serde's default string tags.

/// Declares a fieldless enum that travels as a bare integer.
///
/// Generates the enum, `From<Enum> for $repr`, `TryFrom<$repr> for Enum`,
/// and serde impls that go through the integer.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident: $repr:ty {
            $( $(#[$vmeta:meta])* $variant:ident = $value:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl From<$name> for $repr {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $value ),+
                }
            }
        }

        impl TryFrom<$repr> for $name {
            type Error = $repr;

            /// Returns the unrecognised raw value on failure.
            fn try_from(raw: $repr) -> Result<Self, $repr> {
                match raw {
                    $( v if v == $value => Ok($name::$variant), )+
                    other => Err(other),
                }
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(
                &self,
                serializer: S,
            ) -> Result<S::Ok, S::Error> {
                serde::Serialize::serialize(&<$repr>::from(*self), serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(
                deserializer: D,
            ) -> Result<Self, D::Error> {
                let raw = <$repr as serde::Deserialize>::deserialize(deserializer)?;
                $name::try_from(raw).map_err(|other| {
                    serde::de::Error::custom(format_args!(
                        "invalid {} value: {}",
                        stringify!($name),
                        other
                    ))
                })
            }
        }
    };
}

mod codec;
mod command;
mod error;
mod message;
mod model;

pub use codec::{Codec, JsonCodec};
pub use command::Command;
pub use error::ProtocolError;
pub use message::{
    AnswerMessage, ChatMessage, Envelope, FreeTextAnswerMessage, MessageKind,
    PresenceMessage, QuestionStartedMessage, QuestionStatsMessage,
    QuizAction, QuizControl, QuizInfo, QuizStatsMessage, Recipient,
    RecipientKind, ServerMessage,
};
pub use model::{
    Answer, AnswerId, AnswerStat, Correctness, FreeTextAnswerStat,
    PlayerStat, Question, QuestionId, QuestionStatus, QuestionType, Quiz,
    QuizId, QuizType,
};
