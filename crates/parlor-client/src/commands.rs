//! Slash-command interception.
//!
//! Runs before a draft is sent. Some commands synthesize replacement
//! text and still send (`/roll`, `/flip`, `/me`, the text faces,
//! `/help`); others suppress the send and divert to a secondary flow
//! (`/poll`, `/gif`). Anything unrecognized goes out literally, slash
//! and all. Matching is case-insensitive on the command token only.

use rand::Rng;

const SHRUG: &str = "¯\\_(ツ)_/¯";
const TABLEFLIP: &str = "(╯°□°)╯︵ ┻━┻";
const UNFLIP: &str = "┬─┬ ノ( ゜-゜ノ)";

const HELP_TEXT: &str = "Commands: /roll [NdM], /flip, /me <action>, /shrug, \
                         /tableflip, /unflip, /poll, /gif <search>, /help";

/// Dice bounds for `/roll`; anything outside falls back to a d6.
const MAX_DICE: u32 = 20;
const MAX_SIDES: u32 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Send this text in place of the raw draft.
    Send(String),
    /// Suppress the send and open the poll builder.
    PollBuilder,
    /// Suppress the send and open the GIF picker.
    GifPicker { query: String },
    /// A recognized command with nothing to say; drop the draft quietly.
    Nothing,
    /// Not a command; send the draft as typed.
    PassThrough,
}

/// Inspect a draft and decide what the composer should do with it.
pub fn intercept<R: Rng>(draft: &str, rng: &mut R) -> CommandOutcome {
    let trimmed = draft.trim();
    if !trimmed.starts_with('/') {
        return CommandOutcome::PassThrough;
    }

    let (token, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((token, rest)) => (token, rest.trim()),
        None => (trimmed, ""),
    };

    match token.to_lowercase().as_str() {
        "/roll" => CommandOutcome::Send(roll(rest, rng)),
        "/flip" => {
            let face = if rng.gen_bool(0.5) { "heads" } else { "tails" };
            CommandOutcome::Send(format!("🪙 {face}"))
        }
        "/me" => {
            if rest.is_empty() {
                CommandOutcome::Nothing
            } else {
                CommandOutcome::Send(format!("*{rest}*"))
            }
        }
        "/shrug" => CommandOutcome::Send(with_face(rest, SHRUG)),
        "/tableflip" => CommandOutcome::Send(with_face(rest, TABLEFLIP)),
        "/unflip" => CommandOutcome::Send(with_face(rest, UNFLIP)),
        "/help" => CommandOutcome::Send(HELP_TEXT.to_owned()),
        "/poll" => CommandOutcome::PollBuilder,
        "/gif" => CommandOutcome::GifPicker {
            query: rest.to_owned(),
        },
        _ => CommandOutcome::PassThrough,
    }
}

fn with_face(rest: &str, face: &str) -> String {
    if rest.is_empty() {
        face.to_owned()
    } else {
        format!("{rest} {face}")
    }
}

fn roll<R: Rng>(spec: &str, rng: &mut R) -> String {
    let (count, sides) = parse_dice(spec).unwrap_or((1, 6));
    let rolls: Vec<u32> = (0..count).map(|_| rng.gen_range(1..=sides)).collect();
    let total: u32 = rolls.iter().sum();
    if count == 1 {
        format!("🎲 rolled {total} (1d{sides})")
    } else {
        let parts: Vec<String> = rolls.iter().map(u32::to_string).collect();
        format!("🎲 rolled {} = {total} ({count}d{sides})", parts.join(" + "))
    }
}

/// Parse an `NdM` dice spec; `N` may be omitted.
fn parse_dice(spec: &str) -> Option<(u32, u32)> {
    let spec = spec.to_lowercase();
    let (count, sides) = spec.split_once('d')?;
    let count = if count.is_empty() {
        1
    } else {
        count.parse().ok()?
    };
    let sides: u32 = sides.parse().ok()?;
    if count == 0 || count > MAX_DICE || sides < 2 || sides > MAX_SIDES {
        return None;
    }
    Some((count, sides))
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(
            intercept("hello there", &mut rng()),
            CommandOutcome::PassThrough
        );
        assert_eq!(
            intercept("/notacommand yet", &mut rng()),
            CommandOutcome::PassThrough
        );
    }

    #[test]
    fn token_match_is_case_insensitive() {
        let CommandOutcome::Send(text) = intercept("/SHRUG", &mut rng()) else {
            panic!("expected a send");
        };
        assert_eq!(text, SHRUG);
    }

    #[test]
    fn roll_respects_a_dice_spec() {
        let CommandOutcome::Send(text) = intercept("/roll 3d6", &mut rng()) else {
            panic!("expected a send");
        };
        assert!(text.starts_with("🎲 rolled "));
        assert!(text.ends_with("(3d6)"));
    }

    #[test]
    fn roll_falls_back_to_one_d6() {
        for draft in ["/roll", "/roll garbage", "/roll 0d6", "/roll 99d99999"] {
            let CommandOutcome::Send(text) = intercept(draft, &mut rng()) else {
                panic!("expected a send for {draft}");
            };
            assert!(text.ends_with("(1d6)"), "{draft} gave {text}");
        }
    }

    #[test]
    fn rolls_stay_in_range() {
        let mut rng = rng();
        for _ in 0..100 {
            let CommandOutcome::Send(text) = intercept("/roll 1d6", &mut rng) else {
                panic!("expected a send");
            };
            let value: u32 = text
                .trim_start_matches("🎲 rolled ")
                .split_whitespace()
                .next()
                .and_then(|v| v.parse().ok())
                .unwrap();
            assert!((1..=6).contains(&value));
        }
    }

    #[test]
    fn flip_lands_on_a_side() {
        let CommandOutcome::Send(text) = intercept("/flip", &mut rng()) else {
            panic!("expected a send");
        };
        assert!(text == "🪙 heads" || text == "🪙 tails");
    }

    #[test]
    fn me_wraps_the_action() {
        assert_eq!(
            intercept("/me waves", &mut rng()),
            CommandOutcome::Send("*waves*".into())
        );
        assert_eq!(intercept("/me", &mut rng()), CommandOutcome::Nothing);
    }

    #[test]
    fn faces_keep_leading_text() {
        assert_eq!(
            intercept("/shrug oh well", &mut rng()),
            CommandOutcome::Send(format!("oh well {SHRUG}"))
        );
        assert_eq!(
            intercept("/tableflip", &mut rng()),
            CommandOutcome::Send(TABLEFLIP.into())
        );
        assert_eq!(
            intercept("/unflip", &mut rng()),
            CommandOutcome::Send(UNFLIP.into())
        );
    }

    #[test]
    fn poll_and_gif_divert() {
        assert_eq!(intercept("/poll", &mut rng()), CommandOutcome::PollBuilder);
        assert_eq!(
            intercept("/GIF corgi party", &mut rng()),
            CommandOutcome::GifPicker {
                query: "corgi party".into()
            }
        );
    }

    #[test]
    fn help_lists_the_commands() {
        let CommandOutcome::Send(text) = intercept("/help", &mut rng()) else {
            panic!("expected a send");
        };
        assert!(text.contains("/roll"));
        assert!(text.contains("/gif"));
    }
}
