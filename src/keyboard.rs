use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use uuid::Uuid;

/// Prefix marking callback data as a pending-question answer.
pub const PAYLOAD_PREFIX: &str = "p|";

/// One button per option, labelled with its 1-based index. The callback
/// data carries the ledger entry id and the 0-based option index.
pub fn options_keyboard(options: &[String], pending_id: Uuid) -> InlineKeyboardMarkup {
    let keyboard: Vec<Vec<InlineKeyboardButton>> = options
        .iter()
        .enumerate()
        .map(|(i, option)| {
            vec![InlineKeyboardButton::callback(
                format!("{}. {}", i + 1, option),
                format!("{PAYLOAD_PREFIX}{pending_id}|{i}"),
            )]
        })
        .collect();

    InlineKeyboardMarkup::new(keyboard)
}

/// Parsed `"p|<entry id>|<option index>"` callback data.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackPayload {
    pub pending_id: Uuid,
    pub option_index: usize,
}

impl CallbackPayload {
    pub fn parse(data: &str) -> Option<Self> {
        let mut parts = data.split('|');
        if parts.next()? != "p" {
            return None;
        }
        let pending_id = parts.next()?.parse().ok()?;
        let option_index = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            pending_id,
            option_index,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyboard_encodes_entry_and_index() {
        let id = Uuid::new_v4();
        let options = vec!["Joule".to_string(), "Newton".to_string()];
        let markup = options_keyboard(&options, id);

        assert_eq!(markup.inline_keyboard.len(), 2);
        let second = &markup.inline_keyboard[1][0];
        assert_eq!(second.text, "2. Newton");

        let teloxide::types::InlineKeyboardButtonKind::CallbackData(data) = &second.kind else {
            panic!("expected callback button");
        };
        let payload = CallbackPayload::parse(data).unwrap();
        assert_eq!(payload.pending_id, id);
        assert_eq!(payload.option_index, 1);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        let id = Uuid::new_v4();
        assert!(CallbackPayload::parse("p|not-a-uuid|0").is_none());
        assert!(CallbackPayload::parse(&format!("q|{id}|0")).is_none());
        assert!(CallbackPayload::parse(&format!("p|{id}")).is_none());
        assert!(CallbackPayload::parse(&format!("p|{id}|1|extra")).is_none());
        assert!(CallbackPayload::parse(&format!("p|{id}|one")).is_none());
    }
}
