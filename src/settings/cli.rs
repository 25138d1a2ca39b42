use super::Parser;

#[derive(Parser, Debug)]
pub struct Cli {
    /// Path to the settings TOML file.
    #[arg(long)]
    pub settings: Option<String>,
}
