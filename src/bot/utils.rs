/// The original gate: an address is good enough when it has an `@` and a
/// dot somewhere after it.
pub fn looks_like_email(text: &str) -> bool {
    let text = text.trim();
    match text.find('@') {
        Some(at) if at > 0 => text[at + 1..].contains('.') && !text.contains(char::is_whitespace),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_gate() {
        assert!(looks_like_email("a@example.com"));
        assert!(looks_like_email("  user.name@mail.co  "));
        assert!(!looks_like_email("@example.com"));
        assert!(!looks_like_email("no-at-sign.com"));
        assert!(!looks_like_email("a@nodot"));
        assert!(!looks_like_email("spaces in@mail.com"));
    }
}
