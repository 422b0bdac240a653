use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, instrument};

use crate::actors::messages::{MonitorEvent, MonitorEventKind};
use crate::alerts::NotificationSink;
use crate::config::Discord;
use crate::storage::schema::ItemKind;

const RED: u32 = 15158332;
const GREEN: u32 = 3066993;
const ORANGE: u32 = 15105570;
const LIGHT_BLUE: u32 = 5793266;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

/// Posts domain events as Discord embeds
#[derive(Debug, Clone)]
pub struct DiscordSink {
    client: Client,
    discord: Discord,
}

impl DiscordSink {
    pub fn new(discord: Discord) -> Self {
        Self {
            client: Client::new(),
            discord,
        }
    }

    pub fn build_embed(&self, event: &MonitorEvent) -> Embed {
        let name = &event.display_name;
        let target = match event.target.kind {
            ItemKind::Host => "Host",
            ItemKind::Service => "Service",
        };

        let (title, description, color) = match event.kind {
            MonitorEventKind::ServiceProblem | MonitorEventKind::HostDown => (
                format!("🔴 {target} Problem"),
                format!("{target} **{name}** is in trouble!"),
                RED,
            ),
            MonitorEventKind::ServiceRecovery | MonitorEventKind::HostUp => (
                format!("✅ {target} Recovered"),
                format!("{target} **{name}** is back to normal"),
                GREEN,
            ),
            MonitorEventKind::StartFlapping => (
                "🔁 Flapping".to_string(),
                format!("{target} **{name}** started flapping"),
                ORANGE,
            ),
            MonitorEventKind::StopFlapping => (
                "⏹️ Flapping Stopped".to_string(),
                format!("{target} **{name}** is stable again"),
                GREEN,
            ),
            other => (
                format!("ℹ️ {}", other.name()),
                format!("Update for {} **{name}**", target.to_lowercase()),
                LIGHT_BLUE,
            ),
        };

        let mut fields = Vec::new();
        if let Some(status) = event.status {
            fields.push(EmbedField {
                name: "📊 Status".to_string(),
                value: status.name().to_string(),
                inline: true,
            });
            fields.push(EmbedField {
                name: "🧱 State".to_string(),
                value: if event.is_hard { "hard" } else { "soft" }.to_string(),
                inline: true,
            });
        }
        if let Some(detail) = event.detail.as_deref().filter(|detail| !detail.is_empty()) {
            fields.push(EmbedField {
                name: "📝 Detail".to_string(),
                value: detail.to_string(),
                inline: false,
            });
        }

        let footer = match event.event_id {
            Some(id) => format!("{target}: {name} | event #{id}"),
            None => format!("{target}: {name}"),
        };

        Embed {
            title: Some(title),
            description: Some(description),
            color: Some(color),
            fields,
            footer: Some(EmbedFooter { text: footer }),
            timestamp: Some(event.timestamp.to_rfc3339()),
        }
    }

    pub fn build_message(&self, event: &MonitorEvent) -> Message {
        let mut builder = MessageBuilder::new().add_embed(self.build_embed(event));
        if let Some(user_id) = &self.discord.user_id {
            if event.kind.is_problem() {
                builder = builder.content(format!("🔴 `{}` <@{user_id}>", event.display_name));
            }
        }
        builder.build()
    }

    #[instrument(skip(self, message))]
    pub async fn send_message(&self, message: &Message) {
        match self.client.post(&self.discord.url).json(message).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent Discord message");
                } else {
                    error!("Discord message failed with status: {}", response.status());
                    if let Ok(error_text) = response.text().await {
                        error!("Discord API error response: {}", error_text);
                    }
                }
            }
            Err(e) => {
                error!("Failed to send Discord message: {}", e);
            }
        }
    }
}

#[async_trait]
impl NotificationSink for DiscordSink {
    fn name(&self) -> &str {
        "discord"
    }

    async fn notify(&self, event: &MonitorEvent) {
        self.send_message(&self.build_message(event)).await;
    }
}
