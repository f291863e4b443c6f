//! Interactive confirmation

use colored::Colorize;
use std::io::{self, BufRead, Write};

/// Ask a yes/no question on the terminal; the default is no
pub fn confirm(question: &str) -> io::Result<bool> {
    let stdin = io::stdin();
    let stdout = io::stdout();
    ask(&mut stdin.lock(), &mut stdout.lock(), question)
}

/// Ask until the answer is recognizable. End of input counts as no.
pub fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<bool> {
    loop {
        write!(output, "\n{} ", format!("{} (y/N):", question).yellow().bold())?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(false);
        }

        match line.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" | "" => return Ok(false),
            _ => writeln!(output, "Please enter 'y' for yes or 'n' for no.")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn answer(text: &str) -> (bool, String) {
        let mut input = Cursor::new(text.as_bytes().to_vec());
        let mut output = Vec::new();
        let result = ask(&mut input, &mut output, "Continue?").unwrap();
        (result, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_yes_and_no() {
        assert!(answer("y\n").0);
        assert!(answer("YES\n").0);
        assert!(!answer("n\n").0);
        assert!(!answer("\n").0);
    }

    #[test]
    fn test_end_of_input_is_no() {
        assert!(!answer("").0);
    }

    #[test]
    fn test_reprompts_on_garbage() {
        let (result, output) = answer("maybe\nsure\ny\n");
        assert!(result);
        assert_eq!(output.matches("Please enter").count(), 2);
    }
}
