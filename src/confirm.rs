//! Yes/no confirmation before messages are shown or changed

use inquire::{Confirm, InquireError};

use crate::error::{GmailError, Result};

/// Asks the user whether to go ahead
pub trait ConfirmationGate: Send + Sync {
    /// `Ok(false)` means the user said no; that is not an error
    fn ask(&self, prompt: &str, default_yes: bool) -> Result<bool>;
}

/// Terminal prompt backed by `inquire`
#[derive(Debug, Default, Clone, Copy)]
pub struct InquireGate;

impl ConfirmationGate for InquireGate {
    fn ask(&self, prompt: &str, default_yes: bool) -> Result<bool> {
        match Confirm::new(prompt).with_default(default_yes).prompt() {
            Ok(answer) => Ok(answer),
            // Esc counts as "no"
            Err(InquireError::OperationCanceled) => Ok(false),
            Err(InquireError::OperationInterrupted) => Err(GmailError::OperationCancelled(
                "confirmation prompt interrupted".to_string(),
            )),
            Err(InquireError::IO(e)) => Err(GmailError::IoError(e)),
            Err(e) => Err(GmailError::Unknown(format!("Confirmation prompt failed: {}", e))),
        }
    }
}
