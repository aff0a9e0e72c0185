//! Subcommand: `oracle bot` -- Telegram bot gateway.
//!
//! Long-polls Telegram for incoming messages and hands each text message to
//! the mediator on its own task, so a slow upstream call for one user never
//! holds up anyone else.  Replies go back through `sendMessage`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::{info, warn};

use oracle_core::{Mediator, OracleError};
use oracle_web::{WebConfig, WebServer};

use crate::helpers::{env_non_empty, error_chain, load_mediator};
use crate::messages::Messages;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Telegram Bot API root.  Methods are POSTed to `{ROOT}/bot{token}/{method}`.
pub const TELEGRAM_API_ROOT: &str = "https://api.telegram.org";

/// Extra time allowed on top of the long-poll timeout before giving up.
const POLL_GRACE: Duration = Duration::from_secs(10);

/// Deadline for short API calls such as `sendMessage`.
const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Pause after a failed `getUpdates` before polling again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Environment variable holding the bot token.
pub const BOT_TOKEN_VAR: &str = "TELEGRAM_BOT_TOKEN";

// ---------------------------------------------------------------------------
// Telegram API
// ---------------------------------------------------------------------------

/// Thin client for the handful of Bot API methods the gateway needs.
#[derive(Debug, Clone)]
pub struct TelegramApi {
    http: reqwest::Client,
    base: String,
}

impl TelegramApi {
    pub fn new(token: &str) -> Result<Self> {
        Self::with_root(TELEGRAM_API_ROOT, token)
    }

    /// Point the client at a different API root (self-hosted Bot API server).
    pub fn with_root(root: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("oracle-bot/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build Telegram HTTP client")?;
        Ok(Self {
            http,
            base: format!("{}/bot{token}", root.trim_end_matches('/')),
        })
    }

    /// Call a Bot API method and return its `result` field.
    async fn call(&self, method: &str, body: &Value, timeout: Duration) -> Result<Value> {
        let resp: Value = self
            .http
            .post(format!("{}/{method}", self.base))
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to reach Telegram API ({method})"))?
            .json()
            .await
            .with_context(|| format!("failed to parse Telegram response ({method})"))?;

        if resp.get("ok").and_then(Value::as_bool) != Some(true) {
            let code = resp.get("error_code").and_then(Value::as_i64).unwrap_or(-1);
            let description = resp
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            anyhow::bail!("Telegram {method} failed (code {code}): {description}");
        }

        Ok(resp.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Verify the token and return the bot's username.
    pub async fn get_me(&self) -> Result<String> {
        let me = self.call("getMe", &json!({}), SEND_TIMEOUT).await?;
        Ok(me
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned())
    }

    pub async fn get_updates(&self, offset: i64, poll_timeout: u64) -> Result<Vec<Value>> {
        let result = self
            .call(
                "getUpdates",
                &json!({
                    "offset": offset,
                    "timeout": poll_timeout,
                    "allowed_updates": ["message"],
                }),
                Duration::from_secs(poll_timeout) + POLL_GRACE,
            )
            .await?;
        Ok(result.as_array().cloned().unwrap_or_default())
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        self.call(
            "sendMessage",
            &json!({ "chat_id": chat_id, "text": text }),
            SEND_TIMEOUT,
        )
        .await?;
        Ok(())
    }

    /// Show the "typing..." indicator while the oracle thinks.
    pub async fn send_typing(&self, chat_id: i64) -> Result<()> {
        self.call(
            "sendChatAction",
            &json!({ "chat_id": chat_id, "action": "typing" }),
            SEND_TIMEOUT,
        )
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Update parsing
// ---------------------------------------------------------------------------

/// A text message extracted from a Telegram update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub update_id: i64,
    pub chat_id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub text: String,
}

/// Extract a text message from an update.  Returns `None` for anything else
/// (stickers, photos, edits, service messages).
pub fn parse_update(update: &Value) -> Option<IncomingMessage> {
    let update_id = update.get("update_id")?.as_i64()?;
    let message = update.get("message")?;
    let text = message.get("text")?.as_str()?;

    let chat_id = message.pointer("/chat/id")?.as_i64()?;
    let user_id = message
        .pointer("/from/id")
        .and_then(Value::as_i64)
        .unwrap_or(chat_id);
    let user_name = message
        .pointer("/from/first_name")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_owned();

    Some(IncomingMessage {
        update_id,
        chat_id,
        user_id,
        user_name,
        text: text.to_owned(),
    })
}

/// Bot commands the gateway answers itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
}

/// Recognise `/start` and `/help`, including the `/cmd@botname` form.
pub fn parse_command(text: &str) -> Option<Command> {
    let first = text.split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    match name {
        "start" => Some(Command::Start),
        "help" => Some(Command::Help),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Message handling
// ---------------------------------------------------------------------------

/// Answer one incoming message and send the reply.
pub async fn handle_message(
    api: &TelegramApi,
    mediator: &Mediator,
    msgs: &Messages,
    msg: IncomingMessage,
) -> Result<()> {
    info!(
        chat_id = msg.chat_id,
        user_id = msg.user_id,
        user_name = %msg.user_name,
        text = %msg.text,
        "incoming Telegram message"
    );

    if let Some(command) = parse_command(&msg.text) {
        let reply = match command {
            Command::Start => &msgs.start,
            Command::Help => &msgs.help,
        };
        return api.send_message(msg.chat_id, reply).await;
    }

    if let Err(e) = api.send_typing(msg.chat_id).await {
        warn!(chat_id = msg.chat_id, error = %error_chain(&e), "failed to send typing action");
    }

    let answer = mediator
        .answer(&msg.user_id.to_string(), &msg.text, chrono::Utc::now())
        .await;
    let source = answer.source;

    let reply = match answer.into_result() {
        Ok(text) => text,
        Err(OracleError::CooldownActive { remaining_seconds }) => msgs.cooldown(remaining_seconds),
        Err(e) => return Err(e.into()),
    };

    api.send_message(msg.chat_id, &reply).await?;
    info!(chat_id = msg.chat_id, ?source, "reply sent");
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run the Telegram bot gateway.
pub async fn cmd_bot(config_path: &Path, poll_timeout: u64, web: Option<WebConfig>) -> Result<()> {
    info!("starting Telegram bot gateway");

    let (_config, mediator) = load_mediator(config_path)?;

    let token = bot_token(env_non_empty)?;

    let api = TelegramApi::new(&token)?;
    let bot_name = api.get_me().await.context("Telegram token check failed")?;
    let msgs = Arc::new(Messages::load(config_path));

    if let Some(web_config) = web {
        let server = WebServer::new(web_config, mediator.clone());
        tokio::spawn(async move {
            if let Err(e) = server.start().await {
                tracing::error!(error = %e, "web server stopped");
            }
        });
    }

    println!();
    println!("  Oracle Telegram Bot v{}", env!("CARGO_PKG_VERSION"));
    println!("  Bot: @{bot_name}");
    println!(
        "  Upstream: {}",
        if mediator.upstream_configured() {
            "configured"
        } else {
            "not configured (catalog only)"
        }
    );
    println!("  Cooldown: {}s", mediator.cooldown_window().as_secs());
    println!("  Long-poll timeout: {poll_timeout}s");
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    tokio::select! {
        _ = poll_loop(api, mediator, msgs, poll_timeout, POLL_RETRY_DELAY) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
        }
    }

    Ok(())
}

/// Read the bot token.  A missing or blank value is fatal.
pub fn bot_token<F>(lookup: F) -> oracle_core::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(BOT_TOKEN_VAR)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| OracleError::ConfigurationMissing {
            key: BOT_TOKEN_VAR.into(),
        })
}

/// Poll forever, spawning one task per text message.  A failed poll is
/// logged and retried after `retry_delay` with the same offset.
async fn poll_loop(
    api: TelegramApi,
    mediator: Mediator,
    msgs: Arc<Messages>,
    poll_timeout: u64,
    retry_delay: Duration,
) {
    let mut offset: i64 = 0;

    loop {
        match poll_once(&api, &mediator, &msgs, offset, poll_timeout).await {
            Ok(next) => offset = next,
            Err(e) => {
                warn!(offset, error = %error_chain(&e), "Telegram poll failed, retrying...");
                tokio::time::sleep(retry_delay).await;
            }
        }
    }
}

/// Fetch one batch of updates, dispatch its text messages, and return the
/// offset for the next poll.  Every update is acknowledged, text or not.
async fn poll_once(
    api: &TelegramApi,
    mediator: &Mediator,
    msgs: &Arc<Messages>,
    offset: i64,
    poll_timeout: u64,
) -> Result<i64> {
    let updates = api.get_updates(offset, poll_timeout).await?;
    let mut next = offset;

    for update in &updates {
        if let Some(id) = update.get("update_id").and_then(Value::as_i64) {
            next = next.max(id + 1);
        }

        let Some(msg) = parse_update(update) else {
            continue;
        };

        let api = api.clone();
        let mediator = mediator.clone();
        let msgs = Arc::clone(msgs);
        tokio::spawn(async move {
            let chat_id = msg.chat_id;
            if let Err(e) = handle_message(&api, &mediator, &msgs, msg).await {
                warn!(chat_id, error = %error_chain(&e), "failed to handle message");
            }
        });
    }

    Ok(next)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use oracle_core::{
        InMemoryCooldownStore, OracleConfig, ScriptedRandom, TextGenerator, UpstreamResult,
    };
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Oracle;

    #[async_trait::async_trait]
    impl TextGenerator for Oracle {
        async fn generate(&self, _question: &str, _timeout: Duration) -> UpstreamResult {
            UpstreamResult::Success {
                text: "Да, перемены ждут.".into(),
            }
        }

        fn is_configured(&self) -> bool {
            true
        }
    }

    fn mediator() -> Mediator {
        Mediator::new(
            &OracleConfig::default(),
            Arc::new(InMemoryCooldownStore::new()),
            Arc::new(Oracle),
            Arc::new(ScriptedRandom::new(vec![0.5])),
        )
    }

    fn message(text: &str) -> IncomingMessage {
        IncomingMessage {
            update_id: 1,
            chat_id: 42,
            user_id: 7,
            user_name: "Ann".into(),
            text: text.into(),
        }
    }

    async fn telegram() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendChatAction"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": true })))
            .mount(&server)
            .await;
        server
    }

    #[test]
    fn parses_text_update() {
        let update = json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "from": { "id": 7, "first_name": "Ann", "is_bot": false },
                "chat": { "id": 42, "type": "private" },
                "text": "Да?"
            }
        });
        assert_eq!(
            parse_update(&update),
            Some(IncomingMessage {
                update_id: 10,
                chat_id: 42,
                user_id: 7,
                user_name: "Ann".into(),
                text: "Да?".into(),
            })
        );
    }

    #[test]
    fn ignores_non_text_updates() {
        let sticker = json!({
            "update_id": 11,
            "message": { "chat": { "id": 42 }, "sticker": { "file_id": "x" } }
        });
        let edit = json!({
            "update_id": 12,
            "edited_message": { "chat": { "id": 42 }, "text": "hi" }
        });
        assert_eq!(parse_update(&sticker), None);
        assert_eq!(parse_update(&edit), None);
    }

    #[test]
    fn recognises_commands() {
        assert_eq!(parse_command("/start"), Some(Command::Start));
        assert_eq!(parse_command("/help@oracle_bot"), Some(Command::Help));
        assert_eq!(parse_command("/start payload"), Some(Command::Start));
        assert_eq!(parse_command("/unknown"), None);
        assert_eq!(parse_command("start"), None);
        assert_eq!(parse_command(""), None);
    }

    #[tokio::test]
    async fn question_is_answered_through_mediator() {
        let server = telegram().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(json!({ "chat_id": 42, "text": "Да, перемены ждут." })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
            .expect(1)
            .mount(&server)
            .await;

        let api = TelegramApi::with_root(&server.uri(), "TOKEN").unwrap();
        handle_message(
            &api,
            &mediator(),
            &Messages::default(),
            message("Стоит ли мне менять работу в следующем году?"),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn second_question_gets_cooldown_notice() {
        let server = telegram().await;
        let msgs = Messages::default();
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_string_contains("Следующий вопрос через"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
            .mount(&server)
            .await;

        let api = TelegramApi::with_root(&server.uri(), "TOKEN").unwrap();
        let mediator = mediator();
        handle_message(&api, &mediator, &msgs, message("Да?")).await.unwrap();
        handle_message(&api, &mediator, &msgs, message("Да?")).await.unwrap();
    }

    #[tokio::test]
    async fn start_command_skips_mediator() {
        let server = MockServer::start().await;
        let msgs = Messages::default();
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(json!({ "text": msgs.start })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
            .expect(1)
            .mount(&server)
            .await;

        let api = TelegramApi::with_root(&server.uri(), "TOKEN").unwrap();
        let mediator = mediator();
        handle_message(&api, &mediator, &msgs, message("/start")).await.unwrap();
        // Commands do not consume the cooldown window.
        assert_eq!(mediator.tracked_users().await, 0);
    }

    #[tokio::test]
    async fn telegram_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "error_code": 401,
                "description": "Unauthorized"
            })))
            .mount(&server)
            .await;

        let api = TelegramApi::with_root(&server.uri(), "TOKEN").unwrap();
        let err = api.get_me().await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn missing_bot_token_is_fatal() {
        let err = bot_token(|_| None).unwrap_err();
        assert!(matches!(
            err,
            OracleError::ConfigurationMissing { ref key } if key == BOT_TOKEN_VAR
        ));

        assert!(bot_token(|_| Some("   ".into())).is_err());
        assert_eq!(
            bot_token(|name| (name == BOT_TOKEN_VAR).then(|| "123:abc".to_string())).unwrap(),
            "123:abc"
        );
    }

    #[tokio::test]
    async fn poll_acknowledges_non_text_updates() {
        let server = telegram().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": {} })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getUpdates"))
            .and(body_partial_json(json!({ "offset": 0 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": [
                    {
                        "update_id": 5,
                        "message": {
                            "from": { "id": 7, "first_name": "Ann" },
                            "chat": { "id": 42 },
                            "text": "Да?"
                        }
                    },
                    {
                        "update_id": 6,
                        "message": { "chat": { "id": 42 }, "sticker": { "file_id": "x" } }
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getUpdates"))
            .and(body_partial_json(json!({ "offset": 7 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let api = TelegramApi::with_root(&server.uri(), "TOKEN").unwrap();
        let mediator = mediator();
        let msgs = Arc::new(Messages::default());

        let next = poll_once(&api, &mediator, &msgs, 0, 0).await.unwrap();
        assert_eq!(next, 7);
        // An empty batch keeps the offset.
        assert_eq!(poll_once(&api, &mediator, &msgs, next, 0).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn poll_loop_survives_failed_poll() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": false,
                "error_code": 502,
                "description": "Bad Gateway"
            })))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/getUpdates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": [] })))
            .mount(&server)
            .await;

        let api = TelegramApi::with_root(&server.uri(), "TOKEN").unwrap();
        let handle = tokio::spawn(poll_loop(
            api,
            mediator(),
            Arc::new(Messages::default()),
            0,
            Duration::from_millis(10),
        ));
        tokio::time::sleep(Duration::from_millis(300)).await;
        handle.abort();

        let polls = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter(|r| r.url.path() == "/botTOKEN/getUpdates")
            .count();
        assert!(polls >= 2, "only {polls} poll(s) after a failure");
    }
}
