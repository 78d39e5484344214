//! Messages posted to the UI loop.

use crossterm::event::KeyEvent;

use crate::{
    pipeline::{PipelineError, Report},
    process::OutputLine,
};

/// Everything that changes UI state arrives as one of these on the UI's
/// channel, so only the UI loop ever touches `App`.
#[derive(Debug)]
pub enum TuiEvent {
    /// User keyboard input
    Key(KeyEvent),
    /// A line the running script printed
    Output(OutputLine),
    /// The background run finished
    Finished(Result<Report, PipelineError>),
}
