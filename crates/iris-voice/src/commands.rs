//! **Voice-command interpreter** — maps recognized utterances to intents.
//!
//! An utterance needs the wake phrase to do anything at all. Volume commands
//! parse a target application and an absolute level or a fixed-step
//! direction; anything the grammar cannot place falls back to conversation,
//! so the assistant answers instead of silently failing.

use crate::mixer::{MixerBackend, MixerTarget};
use regex::Regex;
use tracing::debug;

/// Wake phrases, longest first so stripping removes whole phrases.
pub const WAKE_WORDS: [&str; 5] = ["эй ирис", "hey iris", "ирисик", "ирис", "iris"];

/// Known application channels: (utterance alias, canonical mixer name).
const APP_ALIASES: [(&str, &str); 9] = [
    ("музык", "music"),
    ("яндекс", "music"),
    ("спотифай", "spotify"),
    ("spotify", "spotify"),
    ("дискорд", "discord"),
    ("discord", "discord"),
    ("браузер", "browser"),
    ("хром", "browser"),
    ("chrome", "browser"),
];

/// Words that may legitimately follow an action verb without naming an app.
const NON_TARGET_WORDS: [&str; 12] = [
    "тише",
    "громче",
    "звук",
    "громкост",
    "убав",
    "прибав",
    "понизь",
    "повысь",
    "полност",
    "половин",
    "максим",
    "процент",
];

const AUDIO_KEYWORDS: [&str; 12] = [
    "громкость",
    "тише",
    "громче",
    "выключ",
    "включ",
    "музык",
    "звук",
    "mute",
    "замут",
    "размут",
    "убав",
    "прибав",
];

/// Requested volume adjustment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VolumeChange {
    /// Set to this level (0.0-1.0).
    Absolute(f32),
    /// Nudge by this much (signed).
    Delta(f32),
}

/// A structured command parsed from a recognized utterance.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    SetVolume {
        target: MixerTarget,
        change: VolumeChange,
    },
    Mute {
        target: MixerTarget,
    },
    Unmute {
        target: MixerTarget,
    },
    /// Free-form text for the conversation generator.
    Converse(String),
}

/// Interpreter output: either an intent for a handler, or feedback text to
/// speak directly (e.g. the named application is unknown).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Intent(Intent),
    Feedback(String),
}

/// Stateless utterance parser. One per orchestrator.
pub struct CommandInterpreter {
    volume_step: f32,
    percent_re: Regex,
    target_re: Regex,
}

impl CommandInterpreter {
    pub fn new(volume_step: f32) -> Self {
        Self {
            volume_step: volume_step.clamp(0.05, 1.0),
            // "50%", "50 процентов"
            percent_re: Regex::new(r"(\d{1,3})\s*(?:%|процент)").expect("static regex"),
            // word right after an action verb is a target candidate
            target_re: Regex::new(r"(?:сделай|выключи|включи|замуть|размуть|приглуши)\s+([a-zа-яё]+)")
                .expect("static regex"),
        }
    }

    /// Interpret one utterance. `None` without the wake phrase.
    pub fn interpret(&self, utterance: &str) -> Option<Command> {
        let lower = utterance.to_lowercase();
        if !WAKE_WORDS.iter().any(|w| lower.contains(w)) {
            return None;
        }

        let mut rest = lower;
        for wake in WAKE_WORDS {
            rest = rest.replace(wake, " ");
        }
        let rest = rest
            .trim_matches(|c: char| c.is_whitespace() || c == ',' || c == '.' || c == '!')
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        if rest.is_empty() {
            return Some(Command::Intent(Intent::Converse(String::new())));
        }

        if AUDIO_KEYWORDS.iter().any(|kw| rest.contains(kw)) {
            debug!(target: "iris::commands", utterance = %rest, "parsing volume command");
            return Some(self.parse_volume(&rest));
        }

        Some(Command::Intent(Intent::Converse(rest)))
    }

    fn parse_volume(&self, cmd: &str) -> Command {
        let target = match self.find_target(cmd) {
            Ok(t) => t,
            Err(unknown) => {
                return Command::Feedback(format!("Приложение {unknown} не найдено"));
            }
        };

        // "выключи" must win over the "включ" substring it contains.
        let mute = cmd.contains("выключ")
            || cmd.contains("замут")
            || (cmd.contains("mute") && !cmd.contains("unmute") && !cmd.contains("размут"));
        if mute {
            return Command::Intent(Intent::Mute { target });
        }
        if cmd.contains("включ") || cmd.contains("размут") || cmd.contains("unmute") {
            return Command::Intent(Intent::Unmute { target });
        }

        let change = if cmd.contains("тише") || cmd.contains("убав") || cmd.contains("понизь") {
            Some(VolumeChange::Delta(-self.volume_step))
        } else if cmd.contains("громче") || cmd.contains("прибав") || cmd.contains("повысь") {
            Some(VolumeChange::Delta(self.volume_step))
        } else if let Some(caps) = self.percent_re.captures(cmd) {
            caps[1]
                .parse::<f32>()
                .ok()
                .map(|n| VolumeChange::Absolute((n / 100.0).clamp(0.0, 1.0)))
        } else if cmd.contains("половин") || cmd.contains("средн") {
            Some(VolumeChange::Absolute(0.5))
        } else if cmd.contains("максим") || cmd.contains("полн") {
            Some(VolumeChange::Absolute(1.0))
        } else if cmd.contains("четверть") {
            Some(VolumeChange::Absolute(0.25))
        } else {
            None
        };

        match change {
            Some(change) => Command::Intent(Intent::SetVolume { target, change }),
            // Mentions audio but the grammar cannot place it: stay conversational.
            None => Command::Intent(Intent::Converse(cmd.to_string())),
        }
    }

    /// Resolve the target channel: a known app alias, the master channel,
    /// or an explicitly named application we do not know.
    fn find_target(&self, cmd: &str) -> Result<MixerTarget, String> {
        for (alias, canonical) in APP_ALIASES {
            if cmd.contains(alias) {
                return Ok(MixerTarget::App(canonical.to_string()));
            }
        }
        if let Some(caps) = self.target_re.captures(cmd) {
            let word = &caps[1];
            let harmless = NON_TARGET_WORDS.iter().any(|w| word.starts_with(w));
            if !harmless {
                return Err(word.to_string());
            }
        }
        Ok(MixerTarget::Master)
    }
}

/// Apply a mixer intent and phrase the outcome for speech. `Converse` is
/// not a mixer action and returns `None`.
pub fn execute_intent(mixer: &dyn MixerBackend, intent: &Intent) -> Option<String> {
    match intent {
        Intent::SetVolume { target, change } => {
            let level = match change {
                VolumeChange::Absolute(level) => *level,
                VolumeChange::Delta(delta) => {
                    let current = mixer.volume(target).unwrap_or(1.0);
                    (current + delta).clamp(0.0, 1.0)
                }
            };
            Some(match mixer.set_volume(target, level) {
                Ok(()) => format!(
                    "Установила громкость {target} на {}%",
                    (level * 100.0).round() as u32
                ),
                Err(_) => format!("Не смогла установить громкость {target}"),
            })
        }
        Intent::Mute { target } => Some(match mixer.mute(target) {
            Ok(()) => format!("Выключила {target}"),
            Err(_) => format!("Не смогла выключить {target}"),
        }),
        Intent::Unmute { target } => Some(match mixer.unmute(target) {
            Ok(()) => format!("Включила {target}"),
            Err(_) => format!("Не смогла включить {target}"),
        }),
        Intent::Converse(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::NullMixer;

    fn interpreter() -> CommandInterpreter {
        CommandInterpreter::new(0.2)
    }

    #[test]
    fn music_quieter_is_a_fixed_step_down() {
        let cmd = interpreter().interpret("Ирис сделай музыку тише").unwrap();
        assert_eq!(
            cmd,
            Command::Intent(Intent::SetVolume {
                target: MixerTarget::App("music".into()),
                change: VolumeChange::Delta(-0.2),
            })
        );
    }

    #[test]
    fn bare_wake_word_opens_conversation() {
        let cmd = interpreter().interpret("Ирис").unwrap();
        assert_eq!(cmd, Command::Intent(Intent::Converse(String::new())));
    }

    #[test]
    fn no_wake_word_no_intent() {
        assert!(interpreter().interpret("сделай музыку тише").is_none());
    }

    #[test]
    fn mute_discord() {
        let cmd = interpreter().interpret("ирис выключи дискорд").unwrap();
        assert_eq!(
            cmd,
            Command::Intent(Intent::Mute {
                target: MixerTarget::App("discord".into())
            })
        );
    }

    #[test]
    fn unmute_is_not_swallowed_by_mute() {
        let cmd = interpreter().interpret("ирис размуть музыку").unwrap();
        assert_eq!(
            cmd,
            Command::Intent(Intent::Unmute {
                target: MixerTarget::App("music".into())
            })
        );
    }

    #[test]
    fn master_channel_when_no_app_named() {
        let cmd = interpreter().interpret("ирис выключи звук").unwrap();
        assert_eq!(
            cmd,
            Command::Intent(Intent::Mute {
                target: MixerTarget::Master
            })
        );
    }

    #[test]
    fn explicit_percentage_is_absolute() {
        let cmd = interpreter()
            .interpret("ирис громкость музыки 50%")
            .unwrap();
        assert_eq!(
            cmd,
            Command::Intent(Intent::SetVolume {
                target: MixerTarget::App("music".into()),
                change: VolumeChange::Absolute(0.5),
            })
        );
    }

    #[test]
    fn unknown_app_gets_feedback_not_intent() {
        let cmd = interpreter()
            .interpret("ирис выключи калькулятор")
            .unwrap();
        assert_eq!(
            cmd,
            Command::Feedback("Приложение калькулятор не найдено".into())
        );
    }

    #[test]
    fn non_audio_utterance_is_conversation() {
        let cmd = interpreter().interpret("ирис как дела").unwrap();
        assert_eq!(cmd, Command::Intent(Intent::Converse("как дела".into())));
    }

    #[test]
    fn executing_delta_reads_current_level() {
        let mixer = NullMixer::new();
        let target = MixerTarget::App("music".into());
        mixer.set_volume(&target, 0.6).unwrap();
        let feedback = execute_intent(
            &mixer,
            &Intent::SetVolume {
                target: target.clone(),
                change: VolumeChange::Delta(-0.2),
            },
        )
        .unwrap();
        assert_eq!(feedback, "Установила громкость music на 40%");
        assert!((mixer.volume(&target).unwrap() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn converse_is_not_a_mixer_action() {
        let mixer = NullMixer::new();
        assert!(execute_intent(&mixer, &Intent::Converse("привет".into())).is_none());
    }
}
