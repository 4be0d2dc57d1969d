//! Interactive terminal page.
//!
//! Each cycle draws the page, reads one action, runs it to completion through
//! the controller, and draws again.

pub mod builder;
pub mod delegate;

pub use builder::PageBuilder;
pub use delegate::PageAction;

use crate::error::AppError;
use crate::session::{CheckOutcome, DeviceFlowController, SessionState};
use std::io::{self, Write};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

/// Outcome of the previous action, shown on the next draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Error(String),
    Warning(String),
    Info(String),
}

impl Notice {
    /// Errors and warnings cut the rest of the draw short.
    pub fn halts(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Warning(_))
    }
}

impl From<&AppError> for Notice {
    fn from(err: &AppError) -> Self {
        Self::Error(err.user_message())
    }
}

/// Run the page until the user quits or `input` ends.
pub async fn run<R, W>(
    controller: &DeviceFlowController,
    session: &mut SessionState,
    page: &PageBuilder,
    input: R,
    out: &mut W,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut notice: Option<Notice> = None;

    loop {
        page.render(out, session, notice.as_ref())?;
        write!(out, "> ")?;
        out.flush()?;

        let line = match lines.next_line().await? {
            Some(line) => line,
            None => break,
        };
        writeln!(out)?;

        // An empty line just redraws.
        if line.trim().is_empty() {
            notice = None;
            continue;
        }

        let action = match line.parse::<PageAction>() {
            Ok(action) => action,
            Err(message) => {
                notice = Some(Notice::Info(message));
                continue;
            }
        };

        debug!("Page action: {:?}", action);

        notice = match action {
            PageAction::Quit => break,
            PageAction::Help => Some(Notice::Info(delegate::help_text(session.phase()))),
            PageAction::Start => controller
                .start(session)
                .await
                .err()
                .map(|e| Notice::from(&e)),
            PageAction::Check => match controller.check(session).await {
                Ok(CheckOutcome::Authenticated(_)) => None,
                Ok(CheckOutcome::Waiting(warning)) => Some(Notice::Warning(warning.to_string())),
                Err(e) => Some(Notice::from(&e)),
            },
            PageAction::Logout => {
                controller.logout(session);
                None
            }
            PageAction::OpenLink => Some(open_login_link(controller, session)),
        };
    }

    Ok(())
}

/// Open the pending flow's sign-in link in the system browser.
fn open_login_link(controller: &DeviceFlowController, session: &SessionState) -> Notice {
    let flow = match session.flow() {
        Some(flow) => flow,
        None => return Notice::Info("Nothing to open. Type start first.".to_string()),
    };

    let url = flow.login_url(&controller.auth_config().default_verification_uri);
    match open::that(url) {
        Ok(()) => Notice::Info(format!("Opened {} in your browser.", url)),
        Err(e) => {
            warn!("Failed to open browser: {}", e);
            Notice::Info(format!(
                "Could not open a browser. Please visit {} manually.",
                url
            ))
        }
    }
}
