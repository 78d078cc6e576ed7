use crate::core::turn::{ConversationTurn, Role};
use colored::*;

pub fn print_header(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "=".repeat(text.len()).bright_cyan());
}

pub fn print_error(text: &str) {
    eprintln!("{}", text.red().bold());
}

pub fn print_info(text: &str) {
    println!("{}", text.blue());
}

pub fn print_reply(user_id: &str, text: &str) {
    println!("{} {}\n", format!("[{}]", user_id).yellow().bold(), text);
}

pub fn print_turn(turn: &ConversationTurn) {
    let label = format!("{}:", turn.role);
    let label = match turn.role {
        Role::System => label.magenta().bold(),
        Role::User => label.yellow().bold(),
        Role::Assistant => label.green().bold(),
    };
    println!("{} {}", label, turn.content);
}
