use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "cha")]
#[command(about = "Chat with an OpenAI-compatible model from the terminal")]
#[command(version)]
pub struct Cli {
    /// Model to use for chatting; prompts with the available list when missing or unknown
    #[arg(short, long)]
    pub model: Option<String>,

    /// Disable coloured output
    #[arg(long)]
    pub no_color: bool,
}
