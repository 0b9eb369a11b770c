//! Element tokenizer.
//!
//! Walks one framed message from a resumable cursor. The first element is the
//! command name (`+CREG` in `+CREG: 2,1`, or the whole of `OK`); the following
//! ones are its parameters, split on `,`. A `:` only separates the name, so
//! quoted or unquoted times and IPv6 addresses in parameters survive. Quoted
//! sections never split. Elements end at `\r` or at the buffer bound.

use core::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Extract {
    /// More elements follow in this message.
    More,
    /// The element was the last one of the message.
    EndOfMessage,
}

/// Separator rules for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Separators {
    /// Also split on space. Off by default since several URCs carry free text
    /// (`+CME ERROR: SIM PIN required`), on for `CONNECT <rate>`.
    pub space: bool,
}

impl Separators {
    pub const DEFAULT: Self = Self { space: false };
    pub const WITH_SPACE: Self = Self { space: true };
}

/// One element of a message with its 1-based rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub rank: u8,
    bytes: &'a [u8],
}

impl<'a> Token<'a> {
    pub const fn new(rank: u8, bytes: &'a [u8]) -> Self {
        Self { rank, bytes }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Element without surrounding double quotes.
    pub fn unquoted(&self) -> &'a [u8] {
        match self.bytes {
            [b'"', inner @ .., b'"'] => inner,
            other => other,
        }
    }

    pub fn text(&self) -> Option<&'a str> {
        core::str::from_utf8(self.unquoted()).ok()
    }

    pub fn parse<T: FromStr>(&self) -> Option<T> {
        self.text()?.parse().ok()
    }

    /// Parse a hexadecimal element such as a quoted LAC or cell id.
    pub fn hex(&self) -> Option<u32> {
        let text = self.text()?;
        if text.is_empty() {
            return None;
        }
        u32::from_str_radix(text, 16).ok()
    }

    pub fn eq_ignore_case(&self, other: &str) -> bool {
        self.unquoted().eq_ignore_ascii_case(other.as_bytes())
    }
}

pub struct Tokenizer<'a> {
    msg: &'a [u8],
    cursor: usize,
    rank: u8,
    separators: Separators,
    payload: bool,
    done: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(msg: &'a [u8], separators: Separators) -> Self {
        Self {
            msg,
            cursor: 0,
            rank: 0,
            separators,
            payload: false,
            done: false,
        }
    }

    /// Tokenizer over a counted payload: one element, the whole buffer.
    pub fn payload(msg: &'a [u8]) -> Self {
        Self {
            payload: true,
            ..Self::new(msg, Separators::DEFAULT)
        }
    }

    /// Restart a previous walk at `cursor` with `rank` elements already read.
    pub fn resume(msg: &'a [u8], separators: Separators, cursor: usize, rank: u8) -> Self {
        let mut t = Self::new(msg, separators);
        t.cursor = cursor.min(msg.len());
        t.rank = rank;
        t.done = t.at_end();
        t
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn rank(&self) -> u8 {
        self.rank
    }

    /// Bytes not yet walked, up to the terminator.
    pub fn rest(&self) -> &'a [u8] {
        let tail = &self.msg[self.cursor..];
        let end = tail.iter().position(|&b| b == b'\r').unwrap_or(tail.len());
        trim(&tail[..end])
    }

    /// Extract the next element, or `None` once the message is exhausted.
    pub fn extract(&mut self) -> Option<(Token<'a>, Extract)> {
        if self.done {
            return None;
        }
        self.rank = self.rank.saturating_add(1);

        if self.payload {
            self.done = true;
            self.cursor = self.msg.len();
            return Some((Token::new(self.rank, self.msg), Extract::EndOfMessage));
        }

        let start = self.cursor;
        let mut quoted = false;
        let mut end = start;
        let mut next = start;
        let mut separator = None;

        while next < self.msg.len() {
            let b = self.msg[next];
            if b == b'\r' {
                break;
            }
            next += 1;
            if b == b'"' {
                quoted = !quoted;
            } else if !quoted && self.is_separator(b) {
                separator = Some(b);
                break;
            }
            end = next;
        }

        let token = Token::new(self.rank, trim(&self.msg[start..end]));
        self.cursor = next;

        if self.separators.space {
            // A run of spaces separates once.
            while self.cursor < self.msg.len() && self.msg[self.cursor] == b' ' {
                self.cursor += 1;
            }
        }

        // A trailing `,` still announces an empty element, trailing spaces don't.
        let end_of_message = match separator {
            None => true,
            Some(b' ') => self.at_end(),
            Some(_) => false,
        };
        if end_of_message {
            self.done = true;
            Some((token, Extract::EndOfMessage))
        } else {
            Some((token, Extract::More))
        }
    }

    fn is_separator(&self, b: u8) -> bool {
        match b {
            b',' => true,
            b':' => self.rank == 1,
            b' ' => self.separators.space,
            _ => false,
        }
    }

    fn at_end(&self) -> bool {
        self.cursor >= self.msg.len() || self.msg[self.cursor] == b'\r'
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.extract().map(|(token, _)| token)
    }
}

fn trim(mut b: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = b {
        if first.is_ascii_whitespace() {
            b = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = b {
        if last.is_ascii_whitespace() {
            b = rest;
        } else {
            break;
        }
    }
    b
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(msg: &[u8], sep: Separators) -> std::vec::Vec<(u8, std::string::String)> {
        Tokenizer::new(msg, sep)
            .map(|t| {
                (
                    t.rank,
                    std::string::String::from_utf8(t.bytes().to_vec()).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn splits_name_and_params() {
        let out = collect(b"+CREG: 2,1,\"1A2B\",\"01C3\",7", Separators::DEFAULT);
        let tokens: std::vec::Vec<&str> = out.iter().map(|(_, s)| s.as_str()).collect();
        assert_eq!(tokens, ["+CREG", "2", "1", "\"1A2B\"", "\"01C3\"", "7"]);
        assert_eq!(out.last().map(|(r, _)| *r), Some(6));
    }

    #[test]
    fn reports_end_of_message() {
        let mut t = Tokenizer::new(b"+CSQ: 20,99\r\n", Separators::DEFAULT);
        assert_eq!(t.extract().map(|(_, e)| e), Some(Extract::More));
        assert_eq!(t.extract().map(|(_, e)| e), Some(Extract::More));
        let (last, status) = t.extract().unwrap();
        assert_eq!(last.bytes(), b"99");
        assert_eq!(status, Extract::EndOfMessage);
        assert!(t.extract().is_none());
    }

    #[test]
    fn single_element_message() {
        let mut t = Tokenizer::new(b"OK", Separators::DEFAULT);
        let (token, status) = t.extract().unwrap();
        assert_eq!(token.bytes(), b"OK");
        assert_eq!(status, Extract::EndOfMessage);
    }

    #[test]
    fn quotes_protect_separators() {
        let out = collect(b"+QIURC: \"dnsgip\",\"2001:db8::1\"", Separators::DEFAULT);
        assert_eq!(out[2].1, "\"2001:db8::1\"");

        let mut t = Tokenizer::new(b"+COPS: 0,0,\"Telia, SE\",8", Separators::DEFAULT);
        let operator = t.nth(3).unwrap();
        assert_eq!(operator.text(), Some("Telia, SE"));
    }

    #[test]
    fn space_split_is_selectable() {
        let plain = collect(b"+CME ERROR: SIM PIN required", Separators::DEFAULT);
        assert_eq!(plain[0].1, "+CME ERROR");
        assert_eq!(plain[1].1, "SIM PIN required");

        let spaced = collect(b"CONNECT  150", Separators::WITH_SPACE);
        assert_eq!(spaced.len(), 2);
        assert_eq!(spaced[1].1, "150");
    }

    #[test]
    fn resumes_from_cursor() {
        let msg = b"+QIACT: 1,1,\"10.0.0.5\"";
        let mut t = Tokenizer::new(msg, Separators::DEFAULT);
        t.next();
        t.next();
        let (cursor, rank) = (t.cursor(), t.rank());

        let mut resumed = Tokenizer::resume(msg, Separators::DEFAULT, cursor, rank);
        let token = resumed.next().unwrap();
        assert_eq!(token.rank, 3);
        assert_eq!(token.parse::<u8>(), Some(1));
        assert_eq!(resumed.rest(), b"\"10.0.0.5\"");
    }

    #[test]
    fn empty_params_keep_their_rank() {
        let out = collect(b"+CGREG: 2,1,,", Separators::DEFAULT);
        assert_eq!(out.len(), 5);
        assert_eq!(out[3].1, "");
        assert_eq!(out[4].0, 5);
    }

    #[test]
    fn payload_is_a_single_token() {
        let mut t = Tokenizer::payload(b"a,b:c\r\nd");
        let (token, status) = t.extract().unwrap();
        assert_eq!(token.bytes(), b"a,b:c\r\nd");
        assert_eq!(status, Extract::EndOfMessage);
        assert!(t.next().is_none());
    }

    #[test]
    fn token_helpers() {
        let t = Token::new(2, b"\"01C3\"");
        assert_eq!(t.hex(), Some(0x01c3));
        assert!(Token::new(1, b"\"ServingCell\"").eq_ignore_case("servingcell"));
        assert_eq!(Token::new(3, b"-71").parse::<i16>(), Some(-71));
    }
}
