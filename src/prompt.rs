//! Operator prompts
//!
//! Line-based stdin/stdout interaction: free-text answers, numbered picks
//! from an option list, and y/N confirmation. An empty answer means "skip".

use std::io::{self, Write};

/// Ask a free-text question. Empty input returns `None`.
pub fn prompt_line(question: &str) -> io::Result<Option<String>> {
    print!("{}: ", question);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let trimmed = input.trim();
    if trimmed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(trimmed.to_string()))
    }
}

/// Ask the operator to pick from a numbered list. Empty input returns `None`.
pub fn prompt_pick(question: &str, options: &[String]) -> io::Result<Option<usize>> {
    println!("{}:", question);
    for (i, option) in options.iter().enumerate() {
        println!("  {}. {}", i + 1, option);
    }

    loop {
        print!("Choice (1-{}, empty to skip): ", options.len());
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        match trimmed.parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) => return Ok(Some(n - 1)),
            _ => println!("Enter a number between 1 and {}.", options.len()),
        }
    }
}

/// Ask a yes/no question; anything other than y/yes is "no".
pub fn confirm(question: &str) -> io::Result<bool> {
    print!("{} [y/N]: ", question);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let answer = input.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}
