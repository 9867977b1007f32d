use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "sitescan",
    version,
    about = "Loads a page, follows its redirects and records what broke",
    after_help = "Settings: headless=<true|false> (default true), timeout=<ms> per settle round (default 10000)"
)]
pub struct Args {
    /// Page to scan, including the scheme.
    pub url: Option<String>,

    /// `key=value` overrides.
    #[arg(value_name = "SETTING")]
    pub settings: Vec<String>,
}
