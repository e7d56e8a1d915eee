//! External data source for fetching and opening lists.
//!
//! The host reminders application is reached through user-configured
//! commands; the transport is opaque to this crate. Fetching expects
//! tab-separated records on stdout (see [`crate::model::parse_tsv`]); opening
//! passes the list id through verbatim as the command's final argument.

use anyhow::{anyhow, bail, Context, Result};
use std::process::Command;
use tracing::debug;

use crate::model::{parse_tsv, ReminderList};
use crate::settings::Settings;

/// Capability boundary to the external reminders application.
///
/// Fetching can take anywhere from ~100ms to several seconds, so callers on
/// the interactive path must never invoke it directly; only the background
/// refresh job does.
pub trait DataSource {
    /// Fetch all lists. Ordering is whatever the host application produced.
    fn fetch_lists(&self) -> Result<Vec<ReminderList>>;

    /// Open the list with the given (opaque) id in the host application.
    fn open_list(&self, list_id: &str) -> Result<()>;
}

/// [`DataSource`] backed by the command pair from [`Settings`].
pub struct CommandSource {
    fetch_argv: Vec<String>,
    open_argv: Vec<String>,
}

impl CommandSource {
    /// Build from settings, parsing the configured command strings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let fetch_argv = shell_words::split(&settings.fetch_command)
            .context("parsing fetch_command setting")?;
        let open_argv =
            shell_words::split(&settings.open_command).context("parsing open_command setting")?;
        Ok(Self {
            fetch_argv,
            open_argv,
        })
    }

    fn run(argv: &[String], extra_arg: Option<&str>) -> Result<std::process::Output> {
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        if let Some(arg) = extra_arg {
            cmd.arg(arg);
        }
        cmd.output()
            .with_context(|| format!("running command {:?}", argv[0]))
    }
}

impl DataSource for CommandSource {
    fn fetch_lists(&self) -> Result<Vec<ReminderList>> {
        if self.fetch_argv.is_empty() {
            bail!("no fetch_command configured in settings");
        }

        let output = Self::run(&self.fetch_argv, None)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "fetch command failed ({}): {}",
                output.status,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let lists = parse_tsv(&stdout);
        debug!(count = lists.len(), "fetched lists from data source");
        Ok(lists)
    }

    fn open_list(&self, list_id: &str) -> Result<()> {
        if self.open_argv.is_empty() {
            bail!("no open_command configured in settings");
        }

        let output = Self::run(&self.open_argv, Some(list_id))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let text = if stderr.is_empty() { stdout } else { stderr };
            if text.is_empty() {
                bail!("open command failed ({})", output.status);
            }
            return Err(anyhow!(text));
        }

        // On a clean exit only stdout signals failure; commands are free to
        // chatter on stderr.
        if !output.stderr.is_empty() {
            debug!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "open command wrote to stderr"
            );
        }
        if !stdout.is_empty() {
            return Err(anyhow!(stdout));
        }
        Ok(())
    }
}
