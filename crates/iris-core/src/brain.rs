//! Narration brain: turns events and chat into short spoken lines.
//!
//! High-level text comes from an OpenAI-compatible chat-completions API when
//! a key is configured; otherwise (or on any failure) a canned Russian
//! template answers, so the co-host never goes mute because a cloud call
//! failed. Per-category cooldowns keep reactions from flooding the speech
//! queue during event bursts.

use crate::error::{CoreError, CoreResult};
use crate::events::{Event, EventKind};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const DEFAULT_API_BASE: &str = "https://api.groq.com/openai/v1";
const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

const SYSTEM_PROMPT: &str = "Ты — Ирис, AI-компаньон и со-ведущая стримов. \
Ты живая и эмоциональная, любишь игры, следишь за матчем и поддерживаешь стримера. \
Говори кратко, 1-2 предложения, по-русски, без смайликов. \
Не повторяй одни и те же фразы, адаптируй тон под ситуацию: \
радость при победе, поддержка при проигрыше, волнение в напряжённые моменты.";

/// Current game situation attached to LLM prompts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GameContext {
    pub map: String,
    pub round: u32,
    pub ct_score: u32,
    pub t_score: u32,
    pub kills: u32,
    pub deaths: u32,
}

impl GameContext {
    fn prompt_block(&self) -> String {
        format!(
            "Карта: {}. Раунд: {}. Счёт: CT {} - {} T. Статистика стримера: {}/{} (K/D).",
            self.map, self.round, self.ct_score, self.t_score, self.kills, self.deaths
        )
    }
}

// OpenAI-compatible request/response.
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Thin client for an OpenAI-compatible chat-completions endpoint.
/// One bounded attempt per request; failures downgrade to templates.
pub struct LlmBridge {
    base_url: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl LlmBridge {
    /// Build from environment: IRIS_LLM_API_KEY (required),
    /// IRIS_LLM_API_URL, IRIS_LLM_MODEL. Returns `None` without a key.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("IRIS_LLM_API_KEY")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())?;
        let base_url = std::env::var("IRIS_LLM_API_URL")
            .unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let model = std::env::var("IRIS_LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Some(Self::new(base_url, api_key, model))
    }

    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        }
    }

    /// One chat completion. The caller supplies the already-grounded prompt.
    pub async fn complete(&self, system: &str, user: &str) -> CoreResult<String> {
        let url = format!(
            "{}/chat/completions",
            self.base_url.trim_end_matches('/')
        );
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            temperature: 0.85,
            max_tokens: 150,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CoreError::Llm(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(CoreError::Llm(format!("LLM API error {status}: {body}")));
        }
        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| CoreError::Llm(format!("LLM response parse failed: {e}")))?;
        parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::Llm("empty LLM response".into()))
    }
}

fn templates_for(category: &str) -> &'static [&'static str] {
    match category {
        "kill" => &[
            "Красиво!",
            "Отличный выстрел!",
            "Так держать!",
            "Без шансов!",
            "Фраг в копилку!",
            "Уложила бы лучше? Вряд ли!",
        ],
        "death" => &[
            "Бывает...",
            "Ничего, в следующий раз!",
            "Отомстим!",
            "Не расстраивайся!",
            "Держись!",
        ],
        "round_end" => &[
            "Хороший раунд!",
            "Продолжаем!",
            "Дальше будет лучше!",
            "Работаем дальше!",
        ],
        "bomb_planted" => &[
            "Бомба заложена! Напряжёнка!",
            "Бомба на точке! Время пошло!",
        ],
        "bomb_defused" => &[
            "Бомба обезврежена! Красавцы!",
            "Дефуз! Отлично сработано!",
        ],
        "bomb_exploded" => &["Бомба взорвалась...", "Не успели..."],
        "clutch" => &[
            "Это был клатч! Невероятно!",
            "Один против всех — и победа!",
        ],
        "ace" => &["ЭЙС! Вся команда противника!", "Пять фрагов за раунд, это легенда!"],
        "mvp" => &["MVP раунда! Заслуженно!", "Звезда раунда — наш стример!"],
        "donation" => &[
            "Спасибо за донат!",
            "Благодарю за поддержку!",
            "Вау, спасибо!",
            "Ценим поддержку!",
        ],
        "subscription" => &["Добро пожаловать в команду!", "Спасибо за подписку!"],
        "raid" => &["К нам пришёл рейд! Всем привет!", "Встречаем гостей рейда!"],
        "chat_message" => &["Привет!", "Рада видеть!", "Добро пожаловать!"],
        "match_end" => &["Матч окончен, отдохни немного!", "Вот и всё, хорошая игра!"],
        "ambient" => &[
            "Как настроение на стриме?",
            "Играем дальше, я слежу за счётом.",
            "Если что — я на связи.",
        ],
        _ => &[],
    }
}

fn default_cooldowns() -> HashMap<&'static str, Duration> {
    HashMap::from([
        ("kill", Duration::from_secs(3)),
        ("death", Duration::from_secs(5)),
        ("round_end", Duration::from_secs(2)),
        ("bomb_planted", Duration::from_secs(10)),
        ("bomb_defused", Duration::from_secs(10)),
        ("bomb_exploded", Duration::from_secs(10)),
        ("chat_message", Duration::from_secs(8)),
        ("ambient", Duration::from_secs(25)),
    ])
}

/// Event prompt sent to the LLM (grounded with the game context).
fn event_prompt(kind: &EventKind) -> Option<String> {
    let p = match kind {
        EventKind::Kill {
            round_kills,
            streak,
            headshot,
            ..
        } => format!(
            "Стример сделал фраг (за раунд: {round_kills}, серия: {streak}{}). Отреагируй коротко.",
            if *headshot { ", в голову" } else { "" }
        ),
        EventKind::Death { total_deaths } => {
            format!("Стримера убили (всего смертей: {total_deaths}). Поддержи его коротко.")
        }
        EventKind::RoundEnd { won: true, .. } => "Раунд выигран! Порадуйся коротко.".to_string(),
        EventKind::RoundEnd { won: false, .. } => {
            "Раунд проигран. Поддержи команду коротко.".to_string()
        }
        EventKind::BombPlanted { .. } => "Бомба заложена. Прокомментируй напряжение.".to_string(),
        EventKind::BombDefused { ninja: true, .. } => {
            "Ниндзя-дефуз на последних HP! Отреагируй восторженно.".to_string()
        }
        EventKind::BombDefused { .. } => "Бомба обезврежена. Отреагируй коротко.".to_string(),
        EventKind::BombExploded { .. } => "Бомба взорвалась. Прокомментируй коротко.".to_string(),
        EventKind::Clutch { opponents } => {
            format!("Стример выиграл клатч один против {opponents}! Отреагируй восторженно.")
        }
        EventKind::Ace { .. } => "Стример сделал ЭЙС — всю команду противника! Отреагируй восторженно.".to_string(),
        EventKind::Mvp { .. } => "Стример стал MVP раунда. Похвали коротко.".to_string(),
        EventKind::MatchEnd { won, .. } => format!(
            "Матч окончен, стример {}. Подведи итог одной фразой.",
            if *won { "выиграл" } else { "проиграл" }
        ),
        EventKind::Donation {
            amount,
            currency,
            from,
        } => format!("Донат {amount:.0} {currency} от {from}. Поблагодари тепло и коротко."),
        EventKind::Subscription { from } => {
            format!("Новый подписчик: {from}. Поприветствуй коротко.")
        }
        EventKind::Raid { viewers, from } => {
            format!("Рейд от {from}, {viewers} зрителей! Поприветствуй всех.")
        }
        EventKind::ChatMessage { from, text } => {
            format!("Сообщение в чате от {from}: \"{text}\". Ответь коротко и дружелюбно.")
        }
        _ => return None,
    };
    Some(p)
}

/// Generates narration. Single-owner: lives on the orchestrator task.
pub struct Brain {
    llm: Option<LlmBridge>,
    chat_reply_chance: f32,
    cooldowns: HashMap<&'static str, Duration>,
    last_response: HashMap<&'static str, Instant>,
}

impl Brain {
    pub fn new(llm: Option<LlmBridge>, chat_reply_chance: f32) -> Self {
        if llm.is_none() {
            debug!(target: "iris::brain", "no LLM key configured, canned templates only");
        }
        Self {
            llm,
            chat_reply_chance,
            cooldowns: default_cooldowns(),
            last_response: HashMap::new(),
        }
    }

    /// Narrate one event, or `None` when the category is muted (cooldown,
    /// chat sampling, or a non-narrated category).
    pub async fn narrate_event(
        &mut self,
        event: &Event,
        ctx: Option<&GameContext>,
    ) -> Option<String> {
        let category = event.kind.category();
        let prompt = event_prompt(&event.kind)?;

        if !self.cooldown_elapsed(category) {
            debug!(target: "iris::brain", category, "cooldown active, skipping narration");
            return None;
        }
        if category == "chat_message" && !rand::thread_rng().gen_bool(self.chat_reply_chance as f64)
        {
            return None;
        }

        let text = self.generate(&prompt, category, ctx).await;
        if text.is_some() {
            self.mark_responded(category);
        }
        text
    }

    /// Conversational reply to the streamer. Never on cooldown; an empty
    /// utterance gets the stock check-in answer.
    pub async fn converse(&mut self, text: &str, ctx: Option<&GameContext>) -> String {
        if text.trim().is_empty() {
            return "Да, я здесь! Чем могу помочь?".to_string();
        }
        let prompt = format!("Стример говорит тебе: \"{}\". Ответь коротко.", text.trim());
        match self.try_llm(&prompt, ctx).await {
            Some(reply) => reply,
            None => format!("Интересно! Ты сказал: {}", text.trim()),
        }
    }

    /// Idle filler when nothing has happened in a while.
    pub async fn ambient(&mut self, ctx: Option<&GameContext>) -> Option<String> {
        if !self.cooldown_elapsed("ambient") {
            return None;
        }
        let text = self
            .generate(
                "Ничего особенного не происходит. Скажи что-нибудь живое для стрима, одну фразу.",
                "ambient",
                ctx,
            )
            .await;
        if text.is_some() {
            self.mark_responded("ambient");
        }
        text
    }

    async fn generate(
        &mut self,
        prompt: &str,
        category: &str,
        ctx: Option<&GameContext>,
    ) -> Option<String> {
        if let Some(reply) = self.try_llm(prompt, ctx).await {
            return Some(reply);
        }
        templates_for(category)
            .choose(&mut rand::thread_rng())
            .map(|s| (*s).to_string())
    }

    async fn try_llm(&mut self, prompt: &str, ctx: Option<&GameContext>) -> Option<String> {
        let llm = self.llm.as_ref()?;
        let system = match ctx {
            Some(c) => format!("{SYSTEM_PROMPT}\n\nТЕКУЩИЙ КОНТЕКСТ СТРИМА:\n{}", c.prompt_block()),
            None => SYSTEM_PROMPT.to_string(),
        };
        match llm.complete(&system, prompt).await {
            Ok(reply) => Some(reply),
            Err(e) => {
                warn!(target: "iris::brain", "LLM failed, falling back to template: {e}");
                None
            }
        }
    }

    fn cooldown_elapsed(&self, category: &str) -> bool {
        let Some(cooldown) = self.cooldowns.get(category) else {
            return true;
        };
        match self.last_response.get(category) {
            Some(at) => at.elapsed() >= *cooldown,
            None => true,
        }
    }

    fn mark_responded(&mut self, category: &str) {
        let key = self.cooldowns.get_key_value(category).map(|(k, _)| *k);
        if let Some(k) = key {
            self.last_response.insert(k, Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventIdGen, EventKind};
    use chrono::Utc;

    fn kill_event(gen: &EventIdGen) -> Event {
        Event::new(gen.next(), Utc::now(), EventKind::Kill {
            round_kills: 1,
            streak: 1,
            headshot: false,
            weapon: String::new(),
        })
    }

    #[tokio::test]
    async fn falls_back_to_template_without_llm() {
        let gen = EventIdGen::new();
        let mut brain = Brain::new(None, 1.0);
        let text = brain.narrate_event(&kill_event(&gen), None).await;
        assert!(text.is_some());
        assert!(templates_for("kill").contains(&text.unwrap().as_str()));
    }

    #[tokio::test]
    async fn kill_cooldown_mutes_rapid_fire() {
        let gen = EventIdGen::new();
        let mut brain = Brain::new(None, 1.0);
        assert!(brain.narrate_event(&kill_event(&gen), None).await.is_some());
        assert!(brain.narrate_event(&kill_event(&gen), None).await.is_none());
    }

    #[tokio::test]
    async fn highlights_skip_cooldowns() {
        let gen = EventIdGen::new();
        let mut brain = Brain::new(None, 1.0);
        for _ in 0..3 {
            let e = Event::new(gen.next(), Utc::now(), EventKind::Clutch { opponents: 2 });
            assert!(brain.narrate_event(&e, None).await.is_some());
        }
    }

    #[tokio::test]
    async fn empty_converse_gets_stock_answer() {
        let mut brain = Brain::new(None, 1.0);
        let reply = brain.converse("", None).await;
        assert_eq!(reply, "Да, я здесь! Чем могу помочь?");
    }

    #[tokio::test]
    async fn session_tick_is_not_narrated() {
        let gen = EventIdGen::new();
        let mut brain = Brain::new(None, 1.0);
        let e = Event::new(gen.next(), Utc::now(), EventKind::SessionTick { minutes: 10 });
        assert!(brain.narrate_event(&e, None).await.is_none());
    }
}
