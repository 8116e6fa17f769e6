use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "edsclient", about = "Search the EBSCO Discovery Service", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Search EDS and print one page of results
    Search {
        /// Search terms
        #[arg(required = true, num_args = 1..)]
        terms: Vec<String>,

        /// Restrict the terms to one search field (e.g. TI, AU)
        #[arg(long)]
        field: Option<String>,

        /// Results per page
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Offset of the first wanted result
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Profile to search instead of the configured one
        #[arg(long)]
        profile: Option<String>,

        /// Extra EDS search parameter, repeatable (e.g. limiters=FT:y)
        #[arg(long = "param", value_name = "NAME=VALUE", value_parser = parse_param)]
        params: Vec<(String, String)>,
    },

    /// Retrieve one record
    Retrieve {
        /// Record identifier in the form <dbId>,<an>
        id: String,

        /// Profile to use instead of the configured one
        #[arg(long)]
        profile: Option<String>,

        /// Terms to highlight in the record
        #[arg(long)]
        highlight: Option<String>,
    },

    /// Show the search criteria of the current session
    Info,

    /// Store the account password in the system keychain
    Login {
        /// EDS user id
        username: String,
    },

    /// Remove the account password from the system keychain
    Logout {
        /// EDS user id
        username: String,
    },
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{}'", raw)),
    }
}
