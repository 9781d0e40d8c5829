use std::fmt;

use crate::model::EntryType;

/// Form-level rejection. The `Display` text is shown to the user as is.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Entry content must be between {min} and {max} characters (got {actual}).")]
    ContentLength { min: usize, max: usize, actual: usize },
    #[error("Please enter both email and password to sign up.")]
    MissingCredentials,
    #[error("Please enter your email to receive a code.")]
    MissingEmail,
    #[error("Please enter a valid email address.")]
    InvalidEmail,
    #[error("Enter your email and the 6-digit code.")]
    MissingOtp,
    #[error("unknown entry type '{0}'")]
    UnknownEntryType(String),
    #[error("Activity description is required.")]
    MissingDescription,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("entry {0} does not exist")]
    UnknownEntry(String),
    #[error("{from} entries cannot link to {to} entries")]
    NotPermitted { from: EntryType, to: EntryType },
}

/// Backend call that failed, used to build "Failed to ..." messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operation {
    GetCurrentCrisis,
    GetActivityLog,
    CreateActivity,
    FetchResponsibilityCards,
    FetchDocuments,
    FetchBobEntries,
    CreateBobEntry,
    UpdateBobEntry,
    DeleteBobEntry,
    CreateBobLink,
    DeleteBobLink,
    SignIn,
    SendOtp,
    VerifyOtp,
    SignUp,
    SignOut,
    ResolveUser,
    UpsertProfile,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Operation::GetCurrentCrisis => "get current crisis",
            Operation::GetActivityLog => "get activity log",
            Operation::CreateActivity => "create activity",
            Operation::FetchResponsibilityCards => "fetch responsibility cards",
            Operation::FetchDocuments => "fetch documents",
            Operation::FetchBobEntries => "fetch BOB entries",
            Operation::CreateBobEntry => "create BOB entry",
            Operation::UpdateBobEntry => "update BOB entry",
            Operation::DeleteBobEntry => "delete BOB entry",
            Operation::CreateBobLink => "create BOB link",
            Operation::DeleteBobLink => "delete BOB link",
            Operation::SignIn => "sign in",
            Operation::SendOtp => "send one-time code",
            Operation::VerifyOtp => "verify one-time code",
            Operation::SignUp => "sign up",
            Operation::SignOut => "sign out",
            Operation::ResolveUser => "resolve current user",
            Operation::UpsertProfile => "upsert user profile",
        };
        f.write_str(text)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Failed to {operation}: {message}")]
    Remote {
        operation: Operation,
        status: u16,
        message: String,
    },
    #[error("Failed to {operation}: {source}")]
    Transport {
        operation: Operation,
        #[source]
        source: reqwest::Error,
    },
    #[error("Failed to {operation}: unexpected response ({detail})")]
    Decode { operation: Operation, detail: String },
    #[error("Not authenticated: cannot {operation}")]
    NotAuthenticated { operation: Operation },
    #[error("Failed to {operation}: {source}")]
    Link {
        operation: Operation,
        #[source]
        source: LinkError,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl BackendError {
    pub fn operation(&self) -> Option<Operation> {
        match self {
            BackendError::Remote { operation, .. }
            | BackendError::Transport { operation, .. }
            | BackendError::Decode { operation, .. }
            | BackendError::NotAuthenticated { operation }
            | BackendError::Link { operation, .. } => Some(*operation),
            BackendError::Validation(_) => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        match self {
            BackendError::NotAuthenticated { .. } => true,
            BackendError::Remote { status, .. } => matches!(status, 401 | 403),
            _ => false,
        }
    }
}
