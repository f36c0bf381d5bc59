use rand::seq::SliceRandom;
use rand::thread_rng;
use serde::{Deserialize, Serialize};
use shared::{DefaultSweepMessages, StreakRecord, SweepMessages, SweepTier};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use strum::IntoEnumIterator;
use tracing::error;

#[derive(
    Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize, strum::EnumIter, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MsgCategory {
    // Progress posts
    Milestone,
    Completed,
    RejectedProgression,
    RejectedTimeWindow,
    ProgressFailed,

    // Commands for everyone
    Help,
    LeaderboardTitle,
    LeaderboardEmpty,
    Status,
    NotTracked,
    Rank,
    NotRanked,
    RemindersEnabled,
    RemindersDisabled,
    HallOfFameTitle,
    HallOfFameEmpty,
    RepoLinked,
    CommitsTitle,
    CommitsEmpty,

    // Admin commands
    ResetDone,
    ResetDirect,
    ForceSetDone,
    DeactivateDone,
    DeactivateNoop,
    DropDone,
    DropDirect,
    InactiveTitle,
    InactiveNone,
    ListUsersEmpty,
    ListUsersPage,

    // Sweep
    GentleReminder,
    FirmReminder,
    PublicWarning,
    RemovalAnnouncement,
    RemovalDirect,

    // Errors
    ErrorUnknownCommand,
    ErrorRightsViolation,
    ErrorInvalidArgument,
    ErrorUserNotFound,
    ErrorDayRange,
    ErrorRepoFormat,
    ErrorNoLinkedRepo,
    ErrorCommitsUnavailable,
    ErrorGeneric,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Messages {
    message: Vec<String>,
    variables: HashSet<String>,
}

impl Messages {
    pub fn format(&self, values: HashMap<&'static str, String>) -> anyhow::Result<String> {
        let mut formatted_message = self
            .message
            .choose(&mut thread_rng())
            .ok_or_else(|| anyhow::anyhow!("Failed to choose randomly an message"))?
            .clone();
        for key in self.variables.iter() {
            if let Some(value) = values.get(key.as_str()) {
                formatted_message = formatted_message.replace(&format!("{{{}}}", key), value);
            } else {
                error!(
                    "The message expects a variable: {}, but it wasn't provided",
                    key
                );
            }
        }
        Ok(formatted_message)
    }

    fn partial_format(&mut self, values: &HashMap<&'static str, String>) {
        for message in self.message.iter_mut() {
            for (key, value) in values {
                *message = message.replace(&format!("{{{key}}}"), value);
                self.variables.remove(key.to_owned());
            }
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct MessageLoader {
    pub challenge_name: String,

    #[serde(flatten)]
    messages: HashMap<MsgCategory, Messages>,
}

impl MessageLoader {
    pub fn load_from_file(file_path: &PathBuf, log_channel_id: u64) -> anyhow::Result<Self> {
        let file_content = fs::read_to_string(file_path)?;
        Self::from_toml(&file_content, log_channel_id)
    }

    pub fn from_toml(content: &str, log_channel_id: u64) -> anyhow::Result<Self> {
        let mut result: Self = toml::from_str(content)?;

        let missing: Vec<_> = MsgCategory::iter()
            .filter(|category| !result.messages.contains_key(category))
            .map(|category| category.to_string())
            .collect();
        if !missing.is_empty() {
            anyhow::bail!("Message file misses categories: {}", missing.join(", "));
        }

        result.postprocess_messages(log_channel_id);
        tracing::trace!("Loaded messages: {:#?}", result);
        Ok(result)
    }

    fn postprocess_messages(&mut self, log_channel_id: u64) {
        let values = vec![
            ("challenge", self.challenge_name.clone()),
            ("log_channel", format!("<#{log_channel_id}>")),
        ]
        .into_iter()
        .collect::<HashMap<_, _>>();

        for message in self.messages.values_mut() {
            message.partial_format(&values);
        }
    }

    pub fn get_message(&self, category: MsgCategory) -> Option<&Messages> {
        self.messages.get(&category)
    }

    pub fn format(
        &self,
        category: MsgCategory,
        values: Vec<(&'static str, String)>,
    ) -> anyhow::Result<String> {
        self.get_message(category)
            .ok_or_else(|| anyhow::anyhow!("Failed to get message for category: {category}"))?
            .format(values.into_iter().collect())
    }

    /// For replies that must go out even if the template is broken.
    pub fn format_or_log(&self, category: MsgCategory, values: Vec<(&'static str, String)>) -> String {
        self.format(category, values).unwrap_or_else(|e| {
            error!("Failed to format {category} message: {e}");
            String::new()
        })
    }
}

impl SweepMessages for MessageLoader {
    fn reminder(&self, tier: SweepTier, record: &StreakRecord, mention: &str) -> String {
        let category = match tier {
            SweepTier::Gentle => MsgCategory::GentleReminder,
            SweepTier::Firm => MsgCategory::FirmReminder,
            SweepTier::PublicWarning | SweepTier::Removal => MsgCategory::PublicWarning,
        };
        self.format(
            category,
            vec![
                ("day", record.current_day.to_string()),
                ("username", record.username.clone()),
                ("mention", mention.to_string()),
            ],
        )
        .unwrap_or_else(|e| {
            error!("Failed to format {category} message: {e}");
            DefaultSweepMessages.reminder(tier, record, mention)
        })
    }

    fn removal_announcement(&self, record: &StreakRecord, mention: &str) -> String {
        self.format(
            MsgCategory::RemovalAnnouncement,
            vec![
                ("username", record.username.clone()),
                ("mention", mention.to_string()),
            ],
        )
        .unwrap_or_else(|e| {
            error!("Failed to format removal announcement: {e}");
            DefaultSweepMessages.removal_announcement(record, mention)
        })
    }

    fn removal_direct(&self, record: &StreakRecord) -> String {
        self.format(
            MsgCategory::RemovalDirect,
            vec![("username", record.username.clone())],
        )
        .unwrap_or_else(|e| {
            error!("Failed to format removal message: {e}");
            DefaultSweepMessages.removal_direct(record)
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use shared::{StreakRecord, SweepMessages, SweepTier};
    use strum::IntoEnumIterator;

    use super::{MessageLoader, MsgCategory};

    fn load_message_loader() -> MessageLoader {
        MessageLoader::from_toml(include_str!("../../Messages.toml"), 42).unwrap()
    }

    fn record() -> StreakRecord {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        StreakRecord {
            user_id: 7,
            username: "alice".to_string(),
            current_day: 17,
            last_post_timestamp: at,
            is_active: true,
            created_at: at,
            completed_at: None,
            reminders_enabled: true,
        }
    }

    #[test]
    fn every_category_formats() {
        let loader = load_message_loader();
        let values = [
            "day", "username", "mention", "message", "command", "usage", "rank", "repo",
            "status", "days_ago", "last_post", "completed", "days",
        ];

        for category in MsgCategory::iter() {
            let message = loader
                .format(
                    category,
                    values.iter().map(|key| (*key, "x".to_string())).collect(),
                )
                .unwrap();
            assert!(!message.is_empty(), "{category} is empty");
            assert!(!message.contains("{log_channel}"), "{category}");
            assert!(!message.contains("{challenge}"), "{category}");
        }
    }

    #[test]
    fn global_values_are_substituted() {
        let loader = load_message_loader();
        let help = loader.format(MsgCategory::Help, vec![]).unwrap();
        assert!(help.contains("<#42>"));
        assert!(help.contains(&loader.challenge_name));
    }

    #[test]
    fn variables_are_replaced() {
        let loader = load_message_loader();
        let milestone = loader
            .format(MsgCategory::Milestone, vec![("day", "30".to_string())])
            .unwrap();
        assert!(milestone.contains("30"));
        assert!(!milestone.contains("{day}"));
    }

    #[test]
    fn missing_category_is_rejected() {
        let content = r#"
challenge_name = "100 Days of Code"

[milestone]
message = ["Day {day}"]
variables = ["day"]
"#;
        let err = MessageLoader::from_toml(content, 1).unwrap_err();
        assert!(err.to_string().contains("completed"));
    }

    #[test]
    fn sweep_texts_come_from_the_file() {
        let loader = load_message_loader();
        let record = record();

        let gentle = loader.reminder(SweepTier::Gentle, &record, "<@7>");
        assert!(gentle.contains("17"));
        assert!(gentle.contains("<#42>"));

        let public = loader.reminder(SweepTier::PublicWarning, &record, "<@7>");
        assert!(public.contains("<@7>"));

        assert!(loader
            .removal_announcement(&record, "<@7>")
            .contains("<@7>"));
        assert!(!loader.removal_direct(&record).is_empty());
    }
}
