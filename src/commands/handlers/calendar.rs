//! Calendar commands
//!
//! Handles: ical link, renew calendar secret, add ical
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: Subscribing to external calendars
//! - 1.0.0: Calendar links and secret renewal

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info};

use crate::commands::context::ActionContext;
use crate::commands::event::MessageEvent;
use crate::commands::handler::Action;
use crate::core::Formatter;
use crate::database::{Channel, MessageType, ResourceKind};
use crate::delivery::Record;
use crate::features::calendar::importer::IMPORT_LEAD_MINUTES;
use crate::features::calendar::{calendar_link, MIN_SECRET_LENGTH};

pub struct CalendarLinkAction;

#[async_trait]
impl Action for CalendarLinkAction {
    fn name(&self) -> &'static str {
        "Get calendar link"
    }

    fn examples(&self) -> &'static [&'static str] {
        &["calendar link", "show calendar link", "ical"]
    }

    fn pattern(&self) -> &'static str {
        "(?i)(^ical$|(show|give|list|send|write|).*(calendar|ical|cal|reminder|ics)[ ]+(link|url|uri|file))"
    }

    async fn handle(&self, ctx: &ActionContext, event: &MessageEvent, channel: &Channel) -> Result<()> {
        ctx.try_record_event(event, channel, None, MessageType::IcalLinkRequest)
            .await;

        if channel.calendar_secret.len() < MIN_SECRET_LENGTH {
            ctx.reply(
                channel,
                &event.event_id,
                "This channel does not support calendar links. Ask your administrator to set a secret/token for you.",
                MessageType::DoNotSave,
            );
            return Ok(());
        }

        let link = calendar_link(&ctx.base_url, channel.id, &channel.calendar_secret);
        let mut formatter = Formatter::new();
        formatter
            .text_line("With this link you can get access to the calendar (ics) file. Keep it secret!")
            .spoiler(&link);
        ctx.reply_formatted(
            channel,
            &event.event_id,
            formatter.build(),
            Record::new(channel, MessageType::IcalLink),
        );
        Ok(())
    }
}

pub struct RenewCalendarSecretAction;

#[async_trait]
impl Action for RenewCalendarSecretAction {
    fn name(&self) -> &'static str {
        "Renew calendar secret"
    }

    fn examples(&self) -> &'static [&'static str] {
        &["renew calendar secret", "generate new ical token"]
    }

    fn pattern(&self) -> &'static str {
        "(?i)^(make|generate|)[ ]*(renew|generate|delete|regenerate|renew|new)[ ]*(the|a|)[ ]+(ical|calendar|token|secret)[ ]*(token|secret|)[ ]*$"
    }

    async fn handle(&self, ctx: &ActionContext, event: &MessageEvent, channel: &Channel) -> Result<()> {
        ctx.try_record_event(event, channel, None, MessageType::IcalRenewRequest)
            .await;

        match ctx.database.renew_calendar_secret(channel.id).await {
            Ok(_) => {
                info!("Renewed calendar secret of channel {}", channel.id);
                ctx.reply(
                    channel,
                    &event.event_id,
                    "Updated your calendar secret. Your old secret will no longer work.",
                    MessageType::IcalRenew,
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to renew calendar secret of channel {}: {e}", channel.id);
                ctx.reply(
                    channel,
                    &event.event_id,
                    "Failed to generate a new secret.",
                    MessageType::IcalRenew,
                );
                Err(e)
            }
        }
    }
}

/// Normalize a calendar link; `webcal://` links are fetched over https
fn calendar_url(raw: &str) -> Option<String> {
    let raw = raw.trim().trim_start_matches('<').trim_end_matches('>');
    let lower = raw.to_lowercase();
    let url = if lower.starts_with("webcal://") {
        format!("https://{}", &raw["webcal://".len()..])
    } else if lower.starts_with("https://") || lower.starts_with("http://") {
        raw.to_string()
    } else {
        return None;
    };
    let host = url.split("://").nth(1).unwrap_or_default();
    (!host.is_empty() && !host.starts_with('/')).then_some(url)
}

pub struct AddIcalAction;

#[async_trait]
impl Action for AddIcalAction {
    fn name(&self) -> &'static str {
        "Import a calendar"
    }

    fn examples(&self) -> &'static [&'static str] {
        &["add ical https://example.com/calendar.ics", "import calendar webcal://example.com/team.ics"]
    }

    fn pattern(&self) -> &'static str {
        "(?i)^(add|import|subscribe to|subscribe)[ ]+(an|a|the|my|)[ ]*(ical|ics|calendar)[ ]*(feed|file|link|url|)[ ]+[^ ]+[ ]*$"
    }

    async fn handle(&self, ctx: &ActionContext, event: &MessageEvent, channel: &Channel) -> Result<()> {
        ctx.try_record_event(event, channel, None, MessageType::IcalImportRequest)
            .await;

        let text = event.text();
        let Some(url) = text.split_whitespace().last().and_then(calendar_url) else {
            debug!("No calendar link in {text:?}");
            ctx.reply(
                channel,
                &event.event_id,
                "Sorry, I can only import calendars from http, https or webcal links.",
                MessageType::IcalImportFail,
            );
            return Ok(());
        };

        if ctx
            .database
            .find_third_party_resource(channel.id, ResourceKind::Ical, &url)
            .await?
            .is_some()
        {
            ctx.reply(
                channel,
                &event.event_id,
                "This calendar is already imported.",
                MessageType::IcalImportFail,
            );
            return Ok(());
        }

        let resource = ctx
            .database
            .add_third_party_resource(channel.id, ResourceKind::Ical, &url, ctx.now())
            .await?;
        info!("Channel {} imports calendar {}", channel.id, resource.id);
        ctx.reply(
            channel,
            &event.event_id,
            &format!(
                "Added the calendar. I will remind you {IMPORT_LEAD_MINUTES} minutes before each of its events. New events can take up to 30 minutes to show up."
            ),
            MessageType::IcalImportSuccess,
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::TestBed;
    use crate::delivery::testing::wait_for_messages;

    #[tokio::test]
    async fn test_calendar_link_is_hidden_in_spoiler() {
        let bed = TestBed::new().await;
        let event = bed.message("$cal", "show calendar link");

        CalendarLinkAction.handle(&bed.ctx, &event, &bed.channel).await.unwrap();
        wait_for_messages(&bed.transport, 1).await;

        let (_, reply) = &bed.transport.messages()[0];
        let link = format!(
            "https://remind.example/calendar/{}/ical?token={}",
            bed.channel.id, bed.channel.calendar_secret
        );
        assert!(reply.body.contains(&link));
        assert!(reply.body_html.contains(&link));
    }

    #[tokio::test]
    async fn test_renew_secret_changes_link() {
        let bed = TestBed::new().await;
        let event = bed.message("$renew", "renew calendar secret");

        RenewCalendarSecretAction
            .handle(&bed.ctx, &event, &bed.channel)
            .await
            .unwrap();
        wait_for_messages(&bed.transport, 1).await;

        let channel = bed.ctx.database.get_channel(bed.channel.id).await.unwrap().unwrap();
        assert_ne!(channel.calendar_secret, bed.channel.calendar_secret);
        assert_eq!(
            bed.transport.messages()[0].1.body,
            "Updated your calendar secret. Your old secret will no longer work."
        );
    }

    #[test]
    fn test_calendar_url() {
        assert_eq!(
            calendar_url("webcal://cal.example/team.ics").as_deref(),
            Some("https://cal.example/team.ics")
        );
        assert_eq!(
            calendar_url("<https://cal.example/a.ics>").as_deref(),
            Some("https://cal.example/a.ics")
        );
        assert_eq!(calendar_url("ftp://cal.example/a.ics"), None);
        assert_eq!(calendar_url("https://"), None);
        assert_eq!(calendar_url("calendar.ics"), None);
    }

    #[tokio::test]
    async fn test_add_ical_subscribes_channel_once() {
        let bed = TestBed::new().await;
        let router = bed.router();

        router
            .handle_message(&bed.message("$add", "add ical webcal://cal.example/team.ics"))
            .await;
        wait_for_messages(&bed.transport, 1).await;

        let resources = bed
            .ctx
            .database
            .third_party_resources(ResourceKind::Ical)
            .await
            .unwrap();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].channel_id, bed.channel.id);
        assert_eq!(resources[0].url, "https://cal.example/team.ics");

        let (_, reply) = &bed.transport.messages()[0];
        assert!(reply.body.starts_with("Added the calendar. I will remind you 5 minutes before"));
        assert_eq!(reply.reply_to.as_deref(), Some("$add"));
        let request = bed.ctx.database.message_by_external_id("$add").await.unwrap().unwrap();
        assert_eq!(request.message_type, MessageType::IcalImportRequest);

        router
            .handle_message(&bed.message("$again", "import calendar https://cal.example/team.ics"))
            .await;
        wait_for_messages(&bed.transport, 2).await;
        assert_eq!(bed.transport.messages()[1].1.body, "This calendar is already imported.");
        assert_eq!(
            bed.ctx
                .database
                .third_party_resources(ResourceKind::Ical)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_add_ical_rejects_other_links() {
        let bed = TestBed::new().await;
        let event = bed.message("$add", "add ical ftp://cal.example/team.ics");

        AddIcalAction.handle(&bed.ctx, &event, &bed.channel).await.unwrap();
        wait_for_messages(&bed.transport, 1).await;

        assert_eq!(
            bed.transport.messages()[0].1.body,
            "Sorry, I can only import calendars from http, https or webcal links."
        );
        assert!(bed
            .ctx
            .database
            .third_party_resources(ResourceKind::Ical)
            .await
            .unwrap()
            .is_empty());
    }
}
