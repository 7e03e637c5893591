//! Command grammar spoken by chat clients.
//!
//! A payload from a session that has not registered a name yet is always its
//! name. Afterwards every payload is searched for the commands below, in
//! this order, and anything that contains none of them is plain chat:
//!
//! - `@help` replies with [`HELP_TEXT`].
//! - `@wisper <target> <message>` delivers `<message>` to `<target>` only.
//! - `@member` replies with the names of everyone connected.
//!
//! Both the ASCII space and the full-width space (U+3000) count as whitespace
//! in the grammar.

use crate::registry::NamingState;

pub const HELP_COMMAND: &str = "@help";
pub const WHISPER_COMMAND: &str = "@wisper";
pub const MEMBER_COMMAND: &str = "@member";

pub const HELP_TEXT: &str = "Commands:\n\
    \t@help: send this command list to yourself.\n\
    \t@member: send the list of participants to yourself.\n\
    \t@wisper <target> <message>: deliver the message to <target> only.\n";

/// Separator and empty-case text used when answering `@member`.
pub const MEMBER_SEPARATOR: &str = ", ";
pub const NO_MEMBERS: &str = "none";

const GRAMMAR_WHITESPACE: &[char] = &[' ', '\u{3000}'];
const LINE_ENDINGS: &[char] = &['\n', '\r'];

/// What a payload asks the relay to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    /// Empty payload; nothing happens.
    Ignore,
    /// First payload of an unnamed session.
    Register { name: &'a str },
    Help,
    Whisper { target: &'a str, text: &'a str },
    MemberList,
    Chat { text: &'a str },
}

/// Classifies `payload` for a session in `state`.
pub fn classify(payload: &str, state: NamingState) -> Request<'_> {
    if payload.is_empty() {
        return Request::Ignore;
    }

    match state {
        NamingState::Unnamed => Request::Register { name: payload },
        NamingState::Named => parse_command(payload),
    }
}

/// Matches a named session's payload against the command grammar.
///
/// Commands are found anywhere in the payload, so `please @help` asks for
/// help just like `@help` does.
pub fn parse_command(payload: &str) -> Request<'_> {
    if payload.contains(HELP_COMMAND) {
        Request::Help
    } else if let Some((target, text)) = parse_whisper(payload) {
        Request::Whisper { target, text }
    } else if payload.contains(MEMBER_COMMAND) {
        Request::MemberList
    } else {
        Request::Chat { text: payload }
    }
}

/// Takes the first `@wisper` occurrence that is followed by a target and a
/// message on the same line.
fn parse_whisper(payload: &str) -> Option<(&str, &str)> {
    payload
        .match_indices(WHISPER_COMMAND)
        .find_map(|(at, command)| whisper_arguments(&payload[at + command.len()..]))
}

fn whisper_arguments(rest: &str) -> Option<(&str, &str)> {
    let line = rest.split(LINE_ENDINGS).next()?;
    let after_command = line.trim_start_matches(GRAMMAR_WHITESPACE);
    // The command must be followed by whitespace, so "@wisperX" is not a whisper.
    if after_command.len() == line.len() {
        return None;
    }

    let (target, after_target) = after_command.split_once(GRAMMAR_WHITESPACE)?;
    if target.is_empty() {
        return None;
    }

    Some((target, after_target.trim_start_matches(GRAMMAR_WHITESPACE)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unnamed_sessions_register_their_payload_verbatim() {
        assert_eq!(
            classify("@help", NamingState::Unnamed),
            Request::Register { name: "@help" }
        );
        assert_eq!(
            classify(" Alice \n", NamingState::Unnamed),
            Request::Register { name: " Alice \n" }
        );
    }

    #[test]
    fn empty_payloads_are_ignored_in_every_state() {
        assert_eq!(classify("", NamingState::Unnamed), Request::Ignore);
        assert_eq!(classify("", NamingState::Named), Request::Ignore);
    }

    #[test]
    fn help_accepts_trailing_whitespace_of_either_width() {
        assert_eq!(parse_command("@help"), Request::Help);
        assert_eq!(parse_command("@help  "), Request::Help);
        assert_eq!(parse_command("@help\u{3000}"), Request::Help);
        assert_eq!(parse_command("@help\r\n"), Request::Help);
        assert_eq!(parse_command("@helpme"), Request::Help);
    }

    #[test]
    fn commands_are_found_anywhere_in_the_payload() {
        assert_eq!(parse_command("please @help"), Request::Help);
        assert_eq!(parse_command("who is here? @member"), Request::MemberList);
        assert_eq!(
            parse_command("psst @wisper Bob meet at noon"),
            Request::Whisper {
                target: "Bob",
                text: "meet at noon"
            }
        );
    }

    #[test]
    fn member_list_is_recognized() {
        assert_eq!(parse_command("@member"), Request::MemberList);
        assert_eq!(parse_command("@member \u{3000}"), Request::MemberList);
        assert_eq!(parse_command("@members"), Request::MemberList);
    }

    #[test]
    fn whisper_splits_target_from_the_rest() {
        assert_eq!(
            parse_command("@wisper Bob hello there"),
            Request::Whisper {
                target: "Bob",
                text: "hello there"
            }
        );
        assert_eq!(
            parse_command("@wisper\u{3000}ボブ\u{3000}\u{3000}こんにちは"),
            Request::Whisper {
                target: "ボブ",
                text: "こんにちは"
            }
        );
        assert_eq!(
            parse_command("@wisper Bob \n"),
            Request::Whisper {
                target: "Bob",
                text: ""
            }
        );
        assert_eq!(
            parse_command("@wisper Bob hi\nsecond line"),
            Request::Whisper {
                target: "Bob",
                text: "hi"
            }
        );
    }

    #[test]
    fn incomplete_whispers_fall_back_to_chat() {
        assert_eq!(
            parse_command("@wisper Bob"),
            Request::Chat { text: "@wisper Bob" }
        );
        assert_eq!(
            parse_command("@wisperBob hi"),
            Request::Chat {
                text: "@wisperBob hi"
            }
        );
        assert_eq!(
            parse_command("@wisper Bob\nhi there"),
            Request::Chat {
                text: "@wisper Bob\nhi there"
            }
        );
    }

    #[test]
    fn later_whisper_is_used_when_the_first_is_incomplete() {
        assert_eq!(
            parse_command("@wisperX then @wisper Bob hi"),
            Request::Whisper {
                target: "Bob",
                text: "hi"
            }
        );
    }

    #[test]
    fn help_is_checked_before_whisper_and_member() {
        assert_eq!(parse_command("@wisper @help hi"), Request::Help);
        assert_eq!(parse_command("@member @help"), Request::Help);
        assert_eq!(
            parse_command("@wisper Bob @member"),
            Request::Whisper {
                target: "Bob",
                text: "@member"
            }
        );
    }

    #[test]
    fn chat_keeps_the_payload_untouched() {
        assert_eq!(
            parse_command("hello world\n"),
            Request::Chat {
                text: "hello world\n"
            }
        );
    }
}
