//! `orgchat estimate` — Token estimate for a text.

use orgchat_chat::estimate_tokens;

pub fn run(text: &str) {
    println!("{}", estimate_tokens(text));
}
