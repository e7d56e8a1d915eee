//! The remarkably small data model: one record per Reminders list.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// A single list in the external reminders application.
///
/// `list_id` is opaque and is the only reliable identity: account and list
/// names are free text and may coincide across distinct lists. The id must be
/// handed back to the data source verbatim when opening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderList {
    pub account_name: String,
    pub list_name: String,
    pub list_id: String,
}

impl ReminderList {
    pub fn new(
        account_name: impl Into<String>,
        list_name: impl Into<String>,
        list_id: impl Into<String>,
    ) -> Self {
        Self {
            account_name: account_name.into(),
            list_name: list_name.into(),
            list_id: list_id.into(),
        }
    }
}

/// Parse the tab-separated output of a list fetch.
///
/// One list per line: `account name <TAB> list name <TAB> list id`. Lines that
/// fail the shape check (wrong cell count, empty id) are skipped with a
/// diagnostic rather than aborting the whole fetch.
pub fn parse_tsv(output: &str) -> Vec<ReminderList> {
    let mut lists = Vec::new();

    for line in output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let cells: Vec<&str> = line.split('\t').collect();
        if cells.len() != 3 || cells[2].is_empty() {
            warn!(line, "skipping invalid list record");
            continue;
        }
        lists.push(ReminderList::new(cells[0], cells[1], cells[2]));
    }

    lists
}
