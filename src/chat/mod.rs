//! Conversation session management.
//!
//! A [`ChatSession`](session::ChatSession) owns one conversation log,
//! mediates exactly one streaming completion request at a time, and
//! persists every log mutation to a [`HistoryStore`](crate::storage::HistoryStore)
//! without blocking the caller.

pub mod log;
pub mod message;
pub mod session;

use crate::llm::RequestProfile;

/// Which audience a conversation serves.
///
/// Profiles have distinct storage keys, greetings, and backend
/// instruction profiles; a session is created for exactly one profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatProfile {
    /// Patient-facing symptom assistant.
    Patient,
    /// Clinician-facing clinical assistant.
    Clinician,
}

impl ChatProfile {
    /// Storage key for this profile's history.
    pub fn storage_key(self) -> &'static str {
        match self {
            Self::Patient => "chat-history-patient",
            Self::Clinician => "chat-history-clinician",
        }
    }

    /// Greeting seeded into an empty log.
    pub fn greeting(self) -> &'static str {
        match self {
            Self::Patient => {
                "Hello! I am your physiotherapy assistant. How can I help with your \
                 muscle or joint concerns today? You can also start a guided symptom \
                 check whenever you like."
            }
            Self::Clinician => {
                "Hello! I am your clinical assistant. Ask me about differential \
                 diagnoses, treatment protocols, or recent research."
            }
        }
    }

    /// Backend instruction profile for this audience.
    pub fn request_profile(self) -> RequestProfile {
        match self {
            Self::Patient => RequestProfile::Patient,
            Self::Clinician => RequestProfile::Clinician,
        }
    }
}
