//! Six-box one-time code entry.

pub const CODE_LENGTH: usize = 6;

/// `true` for exactly six ASCII digits.
#[must_use]
pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OtpInput {
    digits: [Option<char>; CODE_LENGTH],
}

impl OtpInput {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Type or paste `text` into the box at `index`.
    ///
    /// Digits fill boxes left to right starting at `index`; anything that is
    /// not a digit is skipped and digits past the last box are dropped.
    /// Returns the box that should receive focus next.
    pub fn input(&mut self, index: usize, text: &str) -> usize {
        if index >= CODE_LENGTH {
            return CODE_LENGTH - 1;
        }
        let mut cursor = index;
        for digit in text.chars().filter(char::is_ascii_digit) {
            if cursor >= CODE_LENGTH {
                break;
            }
            self.digits[cursor] = Some(digit);
            cursor += 1;
        }
        cursor.min(CODE_LENGTH - 1)
    }

    /// Clear the box at `index`, or the previous one when it is already empty.
    ///
    /// Returns the box that should receive focus next.
    pub fn backspace(&mut self, index: usize) -> usize {
        let index = index.min(CODE_LENGTH - 1);
        if self.digits[index].is_some() {
            self.digits[index] = None;
            return index;
        }
        if index == 0 {
            return 0;
        }
        self.digits[index - 1] = None;
        index - 1
    }

    pub fn clear(&mut self) {
        self.digits = [None; CODE_LENGTH];
    }

    #[must_use]
    pub fn digit(&self, index: usize) -> Option<char> {
        self.digits.get(index).copied().flatten()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.digits.iter().all(Option::is_some)
    }

    /// The full code, only once every box is filled.
    #[must_use]
    pub fn code(&self) -> Option<String> {
        self.digits.iter().copied().collect::<Option<String>>()
    }
}
