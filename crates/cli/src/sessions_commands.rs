//! `switchboard sessions` subcommands: inspect and clear stored resume ids.

use {
    anyhow::Result, clap::Subcommand, switchboard_config::SwitchboardConfig,
    switchboard_sessions::ResumeStore,
};

#[derive(Subcommand)]
pub enum SessionAction {
    /// List channels with a stored resume id.
    List,
    /// Forget a channel's resume id so its next message starts fresh.
    Clear { channel: String },
}

pub fn handle_sessions(config: &SwitchboardConfig, action: SessionAction) -> Result<()> {
    let store = ResumeStore::load(switchboard_config::resume_store_path(config))?;
    match action {
        SessionAction::List => {
            let entries = store.list();
            if entries.is_empty() {
                println!("No stored sessions ({}).", store.path().display());
            }
            for (channel, entry) in entries {
                println!("  #{channel}  {}  (updated {})", entry.resume_id, entry.updated_at);
            }
        },
        SessionAction::Clear { channel } => {
            let channel = channel.trim_start_matches('#');
            if store.clear(channel)? {
                println!("Cleared resume id for #{channel}.");
            } else {
                println!("No stored session for #{channel}.");
            }
        },
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn config_in(dir: &tempfile::TempDir) -> SwitchboardConfig {
        let mut config = SwitchboardConfig::default();
        config.sessions.store_path = Some(dir.path().join("resume.json"));
        config
    }

    #[test]
    fn clear_removes_stored_entry() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let store = ResumeStore::load(dir.path().join("resume.json")).unwrap();
        store.set("dev", "abc-123").unwrap();

        handle_sessions(&config, SessionAction::Clear {
            channel: "#dev".into(),
        })
        .unwrap();

        let reloaded = ResumeStore::load(dir.path().join("resume.json")).unwrap();
        assert_eq!(reloaded.get("dev"), None);
    }

    #[test]
    fn list_on_missing_store_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        handle_sessions(&config_in(&dir), SessionAction::List).unwrap();
    }
}
