//! Operator input: numbered menus and confirmations

use crate::error::{Error, Result};
use crate::output;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};

/// Source of operator input
pub trait Prompt {
    /// Show `message` and read one line without its line ending
    fn read_line(&mut self, message: &str) -> Result<String>;
}

/// Reads from stdin
pub struct Console;

impl Prompt for Console {
    fn read_line(&mut self, message: &str) -> Result<String> {
        print!("{}", message);
        io::stdout().flush()?;

        let mut input = String::new();
        if io::stdin().lock().read_line(&mut input)? == 0 {
            return Err(Error::EndOfInput);
        }
        Ok(input.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Replays a fixed list of answers, then reports end of input
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    answers: VecDeque<String>,
}

impl ScriptedPrompt {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
        }
    }

    /// Answers not consumed yet
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl Prompt for ScriptedPrompt {
    fn read_line(&mut self, _message: &str) -> Result<String> {
        self.answers.pop_front().ok_or(Error::EndOfInput)
    }
}

/// Read an integer in `start..=end`, re-prompting until one is entered
fn read_in_range(prompt: &mut impl Prompt, start: usize, end: usize) -> Result<usize> {
    loop {
        let input = prompt.read_line(&format!("Enter number in range [{}-{}]: ", start, end))?;
        match input.trim().parse::<usize>() {
            Ok(n) if (start..=end).contains(&n) => return Ok(n),
            Ok(_) => output::error("Entered number is not in range"),
            Err(_) => output::error("Input is not an integer"),
        }
    }
}

/// Show a numbered menu and return the zero-based index picked
pub fn menu<S: AsRef<str>>(prompt: &mut impl Prompt, title: &str, options: &[S]) -> Result<usize> {
    if options.is_empty() {
        return Err(Error::NotFound("options"));
    }

    println!();
    println!("{}", title);
    for (i, option) in options.iter().enumerate() {
        println!("\t[{}]: {}", i + 1, option.as_ref());
    }
    Ok(read_in_range(prompt, 1, options.len())? - 1)
}

/// Ask a yes/no question; anything but an explicit yes declines
pub fn confirm(prompt: &mut impl Prompt, question: &str) -> Result<bool> {
    let answer = prompt.read_line(&format!("{} [y/N]: ", question))?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_reprompts_on_invalid_input() {
        let mut prompt = ScriptedPrompt::new(["x", "0", "4", "2"]);
        let index = menu(&mut prompt, "Pick:", &["a", "b", "c"]).unwrap();

        assert_eq!(index, 1);
        assert_eq!(prompt.remaining(), 0);
    }

    #[test]
    fn test_menu_without_options() {
        let mut prompt = ScriptedPrompt::new(["1"]);
        let options: [&str; 0] = [];
        assert!(matches!(
            menu(&mut prompt, "Pick:", &options),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_confirm_defaults_to_no() {
        let mut prompt = ScriptedPrompt::new(["", "n", "maybe", "Y", " yes "]);
        assert!(!confirm(&mut prompt, "Continue?").unwrap());
        assert!(!confirm(&mut prompt, "Continue?").unwrap());
        assert!(!confirm(&mut prompt, "Continue?").unwrap());
        assert!(confirm(&mut prompt, "Continue?").unwrap());
        assert!(confirm(&mut prompt, "Continue?").unwrap());
    }

    #[test]
    fn test_scripted_prompt_runs_out() {
        let mut prompt = ScriptedPrompt::new(Vec::<String>::new());
        assert!(matches!(prompt.read_line("> "), Err(Error::EndOfInput)));
    }
}
