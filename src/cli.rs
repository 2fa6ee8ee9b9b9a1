use crate::config::Role;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "auditreg")]
#[command(about = "Audit objection settlement register", long_about = None)]
pub struct Cli {
    /// Override the register home directory (config/data subdirs will be created inside it).
    #[arg(long, env = "AUDITREG_HOME")]
    pub home: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Entry(EntryArgs),
    Letter(LetterArgs),
    Baseline(BaselineArgs),
    Cycle(CycleArgs),
    Report(ReportArgs),
    Config(ConfigArgs),
    Office(OfficeArgs),
    Remote(RemoteArgs),
}

#[derive(Debug, Args, Clone)]
pub struct EntryAddArgs {
    #[arg(long)]
    pub entity: String,

    #[arg(long)]
    pub ministry: String,

    #[arg(long, default_value = "")]
    pub branch: String,

    /// Issue date (YYYY-MM-DD or dd/MM/yyyy, Bengali digits accepted). Places the entry in a cycle.
    #[arg(long)]
    pub issue_date: String,

    /// Objections raised outside paragraphs (free text, e.g. "3" or "৩").
    #[arg(long)]
    pub raised_count: Option<String>,

    #[arg(long)]
    pub raised_amount: Option<String>,

    /// Paragraph as "<number>:<full|partial>:<involved>:<recovered>:<adjusted>". Repeatable.
    #[arg(long = "para")]
    pub paragraphs: Vec<String>,
}

#[derive(Debug, Args, Clone, Default)]
pub struct EntryFilterArgs {
    #[arg(long)]
    pub entity: Option<String>,

    #[arg(long)]
    pub ministry: Option<String>,

    /// Only entries inside the cycle ending on the 15th of this month (YYYY-MM).
    #[arg(long)]
    pub month: Option<String>,

    /// Only entries awaiting approval.
    #[arg(long)]
    pub pending: bool,
}

#[derive(Debug, Subcommand)]
pub enum EntryCmd {
    Add(EntryAddArgs),
    List(EntryFilterArgs),
    Show {
        id: String,
    },
    Approve {
        id: String,
    },
    /// Rejecting a pending entry deletes it.
    Reject {
        id: String,
    },
    Delete {
        id: String,
    },
    /// Adds a paragraph ("<number>:<full|partial>:<involved>:<recovered>:<adjusted>").
    ParaAdd {
        id: String,
        para: String,
    },
    /// Removes a paragraph; the entry is deleted once nothing is left in it.
    ParaRemove {
        id: String,
        number: String,
    },
}

#[derive(Debug, Args)]
pub struct EntryArgs {
    #[command(subcommand)]
    pub cmd: EntryCmd,
}

#[derive(Debug, Subcommand)]
pub enum LetterCmd {
    Add {
        #[arg(long)]
        entity: String,
        #[arg(long)]
        ministry: String,
        #[arg(long)]
        letter_no: String,
        #[arg(long)]
        letter_date: Option<String>,
        #[arg(long)]
        diary_no: Option<String>,
        #[arg(long)]
        diary_date: Option<String>,
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long)]
        remarks: Option<String>,
    },
    List {
        #[arg(long)]
        entity: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct LetterArgs {
    #[command(subcommand)]
    pub cmd: LetterCmd,
}

#[derive(Debug, Subcommand)]
pub enum BaselineCmd {
    Set {
        entity: String,
        #[arg(long, default_value = "0")]
        unsettled_count: String,
        #[arg(long, default_value = "0")]
        unsettled_amount: String,
        #[arg(long, default_value = "0")]
        settled_count: String,
        #[arg(long, default_value = "0")]
        settled_amount: String,
    },
    Remove {
        entity: String,
    },
    Show,
}

#[derive(Debug, Args)]
pub struct BaselineArgs {
    #[command(subcommand)]
    pub cmd: BaselineCmd,
}

#[derive(Debug, Args, Clone, Default)]
pub struct CycleSelect {
    /// Any date inside the wanted cycle.
    #[arg(long, conflicts_with = "month")]
    pub date: Option<String>,

    /// Month picker: the cycle ending on the 15th of YYYY-MM.
    #[arg(long)]
    pub month: Option<String>,
}

#[derive(Debug, Args)]
pub struct CycleArgs {
    #[command(flatten)]
    pub select: CycleSelect,

    /// Also print the label with Bengali digits.
    #[arg(long)]
    pub bn: bool,
}

#[derive(Debug, Subcommand)]
pub enum ReportCmd {
    /// Opening, current and closing balances per entity for one cycle.
    Return {
        #[command(flatten)]
        select: CycleSelect,
        #[arg(long)]
        ministry: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Balances of one entity across consecutive cycles.
    History {
        entity: String,
        /// First cycle, by month picker (YYYY-MM).
        #[arg(long)]
        from: String,
        #[arg(long, default_value_t = 6)]
        cycles: usize,
    },
}

#[derive(Debug, Args)]
pub struct ReportArgs {
    #[command(subcommand)]
    pub cmd: ReportCmd,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    Show,
    SetRole {
        #[arg(value_enum)]
        role: Role,
    },
    SetName {
        name: String,
    },
    SetRemote {
        base_url: String,
        #[arg(long, env = "AUDITREG_API_KEY")]
        api_key: String,
        #[arg(long)]
        table: Option<String>,
    },
    ClearRemote,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}

#[derive(Debug, Subcommand)]
pub enum OfficeCmd {
    Check,
    Checkout { name: String },
}

#[derive(Debug, Args)]
pub struct OfficeArgs {
    #[command(subcommand)]
    pub cmd: OfficeCmd,
}

#[derive(Debug, Subcommand)]
pub enum RemoteCmd {
    Pull,
    Push,
    Status,
}

#[derive(Debug, Args)]
pub struct RemoteArgs {
    #[command(subcommand)]
    pub cmd: RemoteCmd,
}
