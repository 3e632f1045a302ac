//! Interactive prompts on the controlling terminal.

use std::io::{self, BufRead, Write};

use anyhow::{Result, bail};
use vibe_relay_core::{DialogId, DialogInfo};

const NAME_WIDTH: usize = 35;

#[derive(Debug, PartialEq, Eq)]
enum Choice {
    Quit,
    Pick(usize),
    Retry(String),
}

fn parse_choice(input: &str, count: usize) -> Choice {
    let input = input.trim();
    if input.eq_ignore_ascii_case("q") {
        return Choice::Quit;
    }
    match input.parse::<usize>() {
        Ok(n) if (1..=count).contains(&n) => Choice::Pick(n - 1),
        Ok(_) => Choice::Retry(format!("Please enter a number between 1 and {count}")),
        Err(_) => Choice::Retry("Please enter a valid number".to_string()),
    }
}

fn display_name(name: &str) -> String {
    if name.chars().count() > NAME_WIDTH {
        let head: String = name.chars().take(NAME_WIDTH).collect();
        format!("{head}…")
    } else {
        name.to_string()
    }
}

/// Numbered dialog table.
pub fn dialog_table(dialogs: &[DialogInfo]) -> String {
    let rule = "─".repeat(50);
    let mut out = format!("{rule}\n  #    ID                 Name\n{rule}\n");
    for (i, d) in dialogs.iter().enumerate() {
        out.push_str(&format!(
            "  {:3}  {:<18} {}\n",
            i + 1,
            d.id,
            display_name(&d.name)
        ));
    }
    out.push_str(&format!("{rule}\n  Found {} chats.\n", dialogs.len()));
    out
}

/// Read one line from stdin. `None` on end of input.
async fn read_line(question: String) -> Result<Option<String>> {
    let line = tokio::task::spawn_blocking(move || -> io::Result<Option<String>> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(question.as_bytes())?;
        stdout.flush()?;
        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line)?;
        Ok((read > 0).then_some(line))
    })
    .await??;
    Ok(line)
}

/// Let the operator choose a dialog from `dialogs`.
///
/// # Errors
/// Fails when there is nothing to choose from, or the operator quits.
pub async fn pick_dialog(dialogs: &[DialogInfo]) -> Result<DialogId> {
    if dialogs.is_empty() {
        bail!("No dialogs found");
    }
    println!("{}", dialog_table(dialogs));
    loop {
        let Some(input) = read_line("Select chat number (or 'q' to quit): ".into()).await? else {
            bail!("No dialog selected");
        };
        match parse_choice(&input, dialogs.len()) {
            Choice::Quit => bail!("No dialog selected"),
            Choice::Pick(index) => {
                let dialog = &dialogs[index];
                println!("\nSelected: {} (ID: {})\n", dialog.name, dialog.id);
                let Ok(id) = dialog.id.parse::<DialogId>();
                return Ok(id);
            }
            Choice::Retry(hint) => println!("  {hint}"),
        }
    }
}

/// Ask a yes/no question; anything but `y`/`yes` is no.
///
/// # Errors
/// Fails if stdin cannot be read.
pub async fn confirm(question: &str) -> Result<bool> {
    let answer = read_line(format!("{question} [y/N]: ")).await?;
    Ok(answer.is_some_and(|a| matches!(a.trim().to_ascii_lowercase().as_str(), "y" | "yes")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("Q\n", 3), Choice::Quit);
        assert_eq!(parse_choice(" 2 ", 3), Choice::Pick(1));
        assert!(matches!(parse_choice("4", 3), Choice::Retry(_)));
        assert!(matches!(parse_choice("0", 3), Choice::Retry(_)));
        assert!(matches!(parse_choice("two", 3), Choice::Retry(_)));
    }

    #[test]
    fn test_long_names_are_truncated() {
        let name = "x".repeat(40);
        let table = dialog_table(&[DialogInfo {
            id: "-100".into(),
            name,
        }]);
        assert!(table.contains(&format!("{}…", "x".repeat(35))));
        assert!(table.contains("Found 1 chats."));
    }
}
