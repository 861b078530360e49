use std::io::{self, Write};

/// Helper function to print a prompt and read one trimmed line from stdin
pub fn prompt_line(prompt: &str) -> io::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Helper function to prompt for a yes/no confirmation; empty input counts as no
pub fn prompt_with_confirmation(prompt: &str) -> io::Result<bool> {
    let response = prompt_line(&format!("{} (y/n): ", prompt))?;
    Ok(is_affirmative(&response))
}

fn is_affirmative(response: &str) -> bool {
    matches!(response.trim().to_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affirmative_responses() {
        assert!(is_affirmative("y"));
        assert!(is_affirmative(" YES "));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("n"));
        assert!(!is_affirmative("maybe"));
    }
}
