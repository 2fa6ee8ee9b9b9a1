mod balance;
mod cli;
mod config;
mod cycle;
mod db;
mod domain;
mod remote;
mod report;
mod text;

use anyhow::{Context, Result, anyhow};
use chrono::{Local, NaiveDate};
use clap::Parser;
use rust_decimal::Decimal;

use crate::cli::{
    BaselineCmd, Cli, Command, ConfigCmd, CycleSelect, EntryAddArgs, EntryCmd, EntryFilterArgs,
    LetterCmd, OfficeCmd, RemoteCmd, ReportCmd,
};
use crate::config::{
    AppConfig, AppPaths, RemoteConfig, app_paths, default_remote_table, load_or_init_config,
    now_utc, write_config,
};
use crate::cycle::{Cycle, cycle_for_month, parse_date, parse_month, resolve_cycle};
use crate::db::Db;
use crate::domain::{
    ApprovalStatus, Balance, ContentRecord, CorrespondenceEntry, Paragraph, ParagraphStatus,
    SettlementEntry, new_correspondence_id, new_settlement_id,
};
use crate::report::{
    RETURN_HEADERS, ReturnFilter, balance_cells, build_history, build_return, return_table_rows,
};
use crate::text::{
    is_textual_zero, normalize_name, parse_localized_count, parse_localized_decimal, same_name,
};

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_env("AUDITREG_LOG")
        .unwrap_or_else(|_| EnvFilter::new("auditreg=warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let paths = app_paths(cli.home.clone())?;
    let (mut cfg, cfg_path) = load_or_init_config(&paths)?;

    let open_register = |cfg: &AppConfig| -> Result<Db> {
        let (db, db_path) = Db::open(&paths, &cfg.current_office)?;
        tracing::debug!(db = %db_path.display(), "register opened");
        Ok(db)
    };

    match cli.command {
        Command::Config(args) => handle_config(args.cmd, &mut cfg, &cfg_path),
        Command::Office(args) => handle_office(args.cmd, &paths, &mut cfg, &cfg_path),
        Command::Cycle(args) => {
            let cycle = select_cycle(&args.select)?;
            println!("start\t{}", cycle.start_date());
            println!("end\t{}", cycle.end_date());
            println!("label\t{}", cycle.label);
            if args.bn {
                println!("label_bn\t{}", cycle.localized_label());
            }
            println!("previous\t{}", cycle.previous().label);
            println!("next\t{}", cycle.next().label);
            Ok(())
        }
        Command::Entry(args) => handle_entry(&open_register(&cfg)?, &cfg, args.cmd),
        Command::Letter(args) => handle_letter(&open_register(&cfg)?, &cfg, args.cmd),
        Command::Baseline(args) => handle_baseline(&open_register(&cfg)?, &cfg, args.cmd),
        Command::Report(args) => handle_report(&open_register(&cfg)?, args.cmd),
        Command::Remote(args) => {
            let db = open_register(&cfg)?;
            handle_remote(&db, &mut cfg, &cfg_path, args.cmd)
        }
    }
}

fn require_admin(cfg: &AppConfig, action: &str) -> Result<()> {
    if !cfg.is_admin() {
        return Err(anyhow!(
            "{action} requires the admin role. Switch with: auditreg config set-role admin"
        ));
    }
    Ok(())
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn select_cycle(select: &CycleSelect) -> Result<Cycle> {
    if let Some(raw) = select.date.as_deref() {
        return Ok(resolve_cycle(parse_date(raw)?));
    }
    if let Some(raw) = select.month.as_deref() {
        let (year, month) = parse_month(raw)?;
        return Ok(cycle_for_month(year, month)?);
    }
    Ok(resolve_cycle(today()))
}

fn parse_amount(raw: &str, field: &'static str) -> Result<Decimal> {
    parse_localized_decimal(raw).with_context(|| format!("Invalid amount for {field}"))
}

fn parse_count(raw: &str, field: &'static str) -> Result<i64> {
    parse_localized_count(raw).with_context(|| format!("Invalid count for {field}"))
}

/// Parses `<number>:<full|partial>[:<involved>[:<recovered>[:<adjusted>]]]`.
fn parse_paragraph(raw: &str) -> Result<Paragraph> {
    let parts: Vec<&str> = raw.split(':').map(str::trim).collect();
    if parts.len() < 2 || parts.len() > 5 {
        return Err(anyhow!(
            "Invalid paragraph {raw:?}. Expected <number>:<full|partial>:<involved>:<recovered>:<adjusted>"
        ));
    }
    let number = parts[0].to_string();
    if number.is_empty() {
        return Err(anyhow!("Paragraph number must not be empty: {raw:?}"));
    }
    let status = ParagraphStatus::parse(parts[1])
        .ok_or_else(|| anyhow!("Invalid paragraph status {:?} (use full or partial)", parts[1]))?;
    let amount_at = |i: usize, field: &'static str| -> Result<Decimal> {
        match parts.get(i) {
            None => Ok(Decimal::ZERO),
            Some(s) => parse_amount(s, field),
        }
    };

    Ok(Paragraph {
        number,
        status,
        involved_amount: amount_at(2, "involved")?,
        recovered_amount: amount_at(3, "recovered")?,
        adjusted_amount: amount_at(4, "adjusted")?,
    })
}

fn load_settlement(db: &Db, id: &str) -> Result<SettlementEntry> {
    match db.get_record(id)? {
        Some(ContentRecord::Settlement(e)) => Ok(e),
        Some(ContentRecord::Correspondence(_)) => {
            Err(anyhow!("'{id}' is a correspondence entry, not a settlement entry"))
        }
        None => Err(anyhow!("No such entry: '{id}'")),
    }
}

fn status_label(status: Option<ApprovalStatus>) -> &'static str {
    match status {
        Some(ApprovalStatus::Pending) => "pending",
        _ => "approved",
    }
}

fn build_settlement(cfg: &AppConfig, args: EntryAddArgs) -> Result<SettlementEntry> {
    let issue_date = parse_date(&args.issue_date)?;

    let manual_raised_count = match args.raised_count {
        Some(raw) if !is_textual_zero(&raw) => {
            parse_count(&raw, "raised count")?;
            Some(raw.trim().to_string())
        }
        other => other,
    };
    let manual_raised_amount = match args.raised_amount.as_deref() {
        Some(raw) => parse_amount(raw, "raised amount")?,
        None => Decimal::ZERO,
    };
    let paragraphs = args
        .paragraphs
        .iter()
        .map(|p| parse_paragraph(p))
        .collect::<Result<Vec<_>>>()?;

    let entity_name = normalize_name(&args.entity);
    if entity_name.is_empty() {
        return Err(anyhow!("Entity name must not be empty"));
    }

    let entry = SettlementEntry {
        id: new_settlement_id(),
        entity_name,
        ministry_name: normalize_name(&args.ministry),
        branch_name: normalize_name(&args.branch),
        paragraphs,
        manual_raised_count,
        manual_raised_amount,
        issue_date_iso: Some(issue_date.format("%Y-%m-%d").to_string()),
        cycle_label: Some(resolve_cycle(issue_date).label),
        approval_status: Some(if cfg.is_admin() {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Pending
        }),
        created_by: Some(cfg.operator_label()),
        created_at: now_utc(),
    };

    if entry.paragraphs.is_empty() && !entry.has_manual_raised() {
        return Err(anyhow!(
            "An entry needs at least one --para or a non-zero --raised-count/--raised-amount"
        ));
    }
    Ok(entry)
}

/// Non-admin edits send an approved entry back for approval.
fn mark_edited(cfg: &AppConfig, entry: &mut SettlementEntry) {
    if !cfg.is_admin() {
        entry.approval_status = Some(ApprovalStatus::Pending);
    }
}

fn matches_filter(entry: &SettlementEntry, filter: &EntryFilterArgs, window: Option<&Cycle>) -> bool {
    if let Some(entity) = &filter.entity {
        if !same_name(&entry.entity_name, entity) {
            return false;
        }
    }
    if let Some(ministry) = &filter.ministry {
        if !same_name(&entry.ministry_name, ministry) {
            return false;
        }
    }
    if filter.pending && entry.is_approved() {
        return false;
    }
    if let Some(cycle) = window {
        match entry.issued_at() {
            Some(ts) if cycle.contains(ts) => {}
            _ => return false,
        }
    }
    true
}

fn handle_entry(db: &Db, cfg: &AppConfig, cmd: EntryCmd) -> Result<()> {
    match cmd {
        EntryCmd::Add(args) => {
            let entry = build_settlement(cfg, args)?;
            db.put_record(&ContentRecord::Settlement(entry.clone()))?;
            println!(
                "Recorded entry {} ({}) in cycle {}.",
                entry.id,
                status_label(entry.approval_status),
                entry.cycle_label.as_deref().unwrap_or("-")
            );
            Ok(())
        }
        EntryCmd::List(filter) => {
            let window = match filter.month.as_deref() {
                Some(raw) => {
                    let (year, month) = parse_month(raw)?;
                    Some(cycle_for_month(year, month)?)
                }
                None => None,
            };
            let loaded = db.load_entries()?;
            let rows: Vec<&SettlementEntry> = loaded
                .settlements
                .iter()
                .filter(|e| matches_filter(e, &filter, window.as_ref()))
                .collect();

            if rows.is_empty() {
                println!("(no entries)");
                return Ok(());
            }

            println!("id\tstatus\tissue_date\tentity\tministry\traised\tparas");
            for e in rows {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}\t{}",
                    e.id,
                    status_label(e.approval_status),
                    e.issue_date_iso.as_deref().unwrap_or("-"),
                    e.entity_name,
                    e.ministry_name,
                    e.raised_count(),
                    e.paragraphs.len()
                );
            }
            Ok(())
        }
        EntryCmd::Show { id } => {
            let Some(record) = db.get_record(&id)? else {
                return Err(anyhow!("No such entry: '{id}'"));
            };
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        EntryCmd::Approve { id } => {
            require_admin(cfg, "Approving entries")?;
            let mut entry = load_settlement(db, &id)?;
            entry.approval_status = Some(ApprovalStatus::Approved);
            db.put_record(&ContentRecord::Settlement(entry))?;
            println!("Approved entry {id}.");
            Ok(())
        }
        EntryCmd::Reject { id } => {
            require_admin(cfg, "Rejecting entries")?;
            let entry = load_settlement(db, &id)?;
            if entry.is_approved() {
                return Err(anyhow!(
                    "Entry {id} is already approved; use `auditreg entry delete {id}` instead"
                ));
            }
            db.delete_content(&id)?;
            println!("Rejected and removed entry {id}.");
            Ok(())
        }
        EntryCmd::Delete { id } => {
            require_admin(cfg, "Deleting entries")?;
            if !db.delete_content(&id)? {
                return Err(anyhow!("No such entry: '{id}'"));
            }
            println!("Deleted entry {id}.");
            Ok(())
        }
        EntryCmd::ParaAdd { id, para } => {
            let mut entry = load_settlement(db, &id)?;
            let para = parse_paragraph(&para)?;
            if entry.paragraphs.iter().any(|p| p.has_number(&para.number)) {
                return Err(anyhow!(
                    "Entry {id} already has paragraph {}",
                    para.number
                ));
            }
            let number = para.number.clone();
            entry.paragraphs.push(para);
            mark_edited(cfg, &mut entry);
            db.put_record(&ContentRecord::Settlement(entry))?;
            println!("Added paragraph {number} to entry {id}.");
            Ok(())
        }
        EntryCmd::ParaRemove { id, number } => {
            let mut entry = load_settlement(db, &id)?;
            let before = entry.paragraphs.len();
            entry.paragraphs.retain(|p| !p.has_number(&number));
            if entry.paragraphs.len() == before {
                return Err(anyhow!("Entry {id} has no paragraph {number}"));
            }

            if entry.paragraphs.is_empty() && !entry.has_manual_raised() {
                db.delete_content(&id)?;
                println!("Removed paragraph {number}; entry {id} was empty and has been deleted.");
                return Ok(());
            }

            mark_edited(cfg, &mut entry);
            db.put_record(&ContentRecord::Settlement(entry))?;
            println!("Removed paragraph {number} from entry {id}.");
            Ok(())
        }
    }
}

fn handle_letter(db: &Db, cfg: &AppConfig, cmd: LetterCmd) -> Result<()> {
    match cmd {
        LetterCmd::Add {
            entity,
            ministry,
            letter_no,
            letter_date,
            diary_no,
            diary_date,
            subject,
            remarks,
        } => {
            let iso = |raw: Option<String>| -> Result<Option<String>> {
                raw.map(|r| parse_date(&r).map(|d| d.format("%Y-%m-%d").to_string()))
                    .transpose()
                    .map_err(Into::into)
            };
            let letter = CorrespondenceEntry {
                id: new_correspondence_id(),
                entity_name: normalize_name(&entity),
                ministry_name: normalize_name(&ministry),
                letter_no: letter_no.trim().to_string(),
                letter_date: iso(letter_date)?,
                diary_no,
                diary_date: iso(diary_date)?,
                subject,
                remarks,
                approval_status: Some(if cfg.is_admin() {
                    ApprovalStatus::Approved
                } else {
                    ApprovalStatus::Pending
                }),
                created_at: now_utc(),
            };
            db.put_record(&ContentRecord::Correspondence(letter.clone()))?;
            println!("Recorded letter {} ({}).", letter.id, letter.letter_no);
            Ok(())
        }
        LetterCmd::List { entity } => {
            let loaded = db.load_entries()?;
            let rows: Vec<&CorrespondenceEntry> = loaded
                .correspondence
                .iter()
                .filter(|l| match &entity {
                    Some(name) => same_name(&l.entity_name, name),
                    None => true,
                })
                .collect();

            if rows.is_empty() {
                println!("(no letters)");
                return Ok(());
            }

            let table: Vec<Vec<String>> = rows
                .iter()
                .map(|l| {
                    vec![
                        l.id.clone(),
                        l.letter_no.clone(),
                        l.letter_date.clone().unwrap_or_else(|| "-".to_string()),
                        l.diary_no.clone().unwrap_or_else(|| "-".to_string()),
                        l.entity_name.clone(),
                        l.subject.clone(),
                        status_label(l.approval_status).to_string(),
                    ]
                })
                .collect();
            print_table(
                &["id", "letter_no", "letter_date", "diary_no", "entity", "subject", "status"],
                &table,
            );
            Ok(())
        }
    }
}

fn handle_baseline(db: &Db, cfg: &AppConfig, cmd: BaselineCmd) -> Result<()> {
    match cmd {
        BaselineCmd::Set {
            entity,
            unsettled_count,
            unsettled_amount,
            settled_count,
            settled_amount,
        } => {
            require_admin(cfg, "Editing the opening balance")?;
            let balance = Balance {
                unsettled_count: parse_count(&unsettled_count, "unsettled count")?,
                unsettled_amount: parse_amount(&unsettled_amount, "unsettled amount")?,
                settled_count: parse_count(&settled_count, "settled count")?,
                settled_amount: parse_amount(&settled_amount, "settled amount")?,
            };
            let mut stats = db.load_baseline()?;
            stats.set(&entity, balance);
            stats.updated_at = Some(now_utc());
            db.save_baseline(&stats)?;
            println!("Set opening balance for '{}'.", normalize_name(&entity));
            Ok(())
        }
        BaselineCmd::Remove { entity } => {
            require_admin(cfg, "Editing the opening balance")?;
            let mut stats = db.load_baseline()?;
            if !stats.remove(&entity) {
                return Err(anyhow!("No opening balance for '{entity}'"));
            }
            stats.updated_at = Some(now_utc());
            db.save_baseline(&stats)?;
            println!("Removed opening balance for '{}'.", normalize_name(&entity));
            Ok(())
        }
        BaselineCmd::Show => {
            let stats = db.load_baseline()?;
            if stats.entities.is_empty() {
                println!("(no opening balances)");
                return Ok(());
            }
            let rows: Vec<Vec<String>> = stats
                .entities
                .iter()
                .map(|(name, b)| {
                    vec![
                        name.clone(),
                        b.unsettled_count.to_string(),
                        b.unsettled_amount.to_string(),
                        b.settled_count.to_string(),
                        b.settled_amount.to_string(),
                    ]
                })
                .collect();
            print_table(
                &[
                    "entity",
                    "unsettled",
                    "unsettled_amt",
                    "settled",
                    "settled_amt",
                ],
                &rows,
            );
            Ok(())
        }
    }
}

fn handle_report(db: &Db, cmd: ReportCmd) -> Result<()> {
    let loaded = db.load_entries()?;
    let baseline = db.load_baseline()?;

    match cmd {
        ReportCmd::Return {
            select,
            ministry,
            json,
        } => {
            let cycle = select_cycle(&select)?;
            let ret = build_return(
                &cycle,
                &baseline,
                &loaded.settlements,
                &ReturnFilter { ministry },
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&ret)?);
                return Ok(());
            }

            println!("cycle\t{}", ret.cycle.label);
            if ret.rows.is_empty() {
                println!("(no entities)");
            } else {
                print_table(RETURN_HEADERS, &return_table_rows(&ret));
            }
            if ret.pending > 0 {
                println!("({} pending entries not included)", ret.pending);
            }
            if !ret.undated.is_empty() {
                println!(
                    "(warning: {} entries have no usable issue date and are excluded: {})",
                    ret.undated.len(),
                    ret.undated.join(", ")
                );
            }
            Ok(())
        }
        ReportCmd::History {
            entity,
            from,
            cycles,
        } => {
            let (year, month) = parse_month(&from)?;
            let first = cycle_for_month(year, month)?;
            let history = build_history(&entity, &first, cycles, &baseline, &loaded.settlements);

            let mut headers = vec!["cycle"];
            headers.extend(RETURN_HEADERS.iter().skip(2));
            let rows: Vec<Vec<String>> = history
                .iter()
                .map(|(cycle, balance)| {
                    let mut cells = vec![cycle.label.clone()];
                    cells.extend(balance_cells(balance));
                    cells
                })
                .collect();
            println!("entity\t{}", normalize_name(&entity));
            print_table(&headers[..], &rows);
            Ok(())
        }
    }
}

fn handle_config(cmd: ConfigCmd, cfg: &mut AppConfig, cfg_path: &std::path::Path) -> Result<()> {
    match cmd {
        ConfigCmd::Show => {
            let mut shown = cfg.clone();
            if let Some(remote) = shown.remote.as_mut() {
                remote.api_key = "********".to_string();
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
        ConfigCmd::SetRole { role } => {
            cfg.role = role;
            write_config(cfg_path, cfg)?;
            println!("Role set to {}.", serde_json::to_string(&role)?.trim_matches('"'));
        }
        ConfigCmd::SetName { name } => {
            cfg.operator_name = Some(name.trim().to_string());
            write_config(cfg_path, cfg)?;
            println!("Operator name set to '{}'.", name.trim());
        }
        ConfigCmd::SetRemote {
            base_url,
            api_key,
            table,
        } => {
            cfg.remote = Some(RemoteConfig {
                base_url: base_url.clone(),
                api_key,
                table: table.unwrap_or_else(default_remote_table),
            });
            write_config(cfg_path, cfg)?;
            println!("Remote set to {base_url}.");
        }
        ConfigCmd::ClearRemote => {
            cfg.remote = None;
            write_config(cfg_path, cfg)?;
            println!("Remote cleared.");
        }
    }
    Ok(())
}

fn handle_office(
    cmd: OfficeCmd,
    paths: &AppPaths,
    cfg: &mut AppConfig,
    cfg_path: &std::path::Path,
) -> Result<()> {
    match cmd {
        OfficeCmd::Check => {
            println!("You are currently in office: {}", cfg.current_office);
        }
        OfficeCmd::Checkout { name } => {
            let _ = Db::open(paths, &name)?;
            cfg.current_office = name.clone();
            write_config(cfg_path, cfg)?;
            println!("Checked out office: {name}");
        }
    }
    Ok(())
}

fn handle_remote(
    db: &Db,
    cfg: &mut AppConfig,
    cfg_path: &std::path::Path,
    cmd: RemoteCmd,
) -> Result<()> {
    let not_configured =
        || anyhow!("No remote configured. Run: auditreg config set-remote <url> --api-key <key>");

    match cmd {
        RemoteCmd::Status => {
            match &cfg.remote {
                Some(r) => println!("remote\t{}", crate::remote::table_url(r)),
                None => println!("remote\t(not configured)"),
            }
            let last_pull = cfg
                .last_pull_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "(never)".to_string());
            println!("last_pull\t{last_pull}");

            let ops = db.list_outbox()?;
            println!("queued\t{}", ops.len());
            if let Some(oldest) = ops.first() {
                println!("oldest_queued\t{}", oldest.queued_at.to_rfc3339());
            }
        }
        RemoteCmd::Pull => {
            let remote = cfg.remote.clone().ok_or_else(not_configured)?;
            let stats = crate::remote::pull(db, &remote)?;
            cfg.last_pull_at = Some(now_utc());
            write_config(cfg_path, cfg)?;
            println!(
                "Pulled {} rows ({} kept with queued local writes, {} removed).",
                stats.applied, stats.kept_local, stats.removed
            );
        }
        RemoteCmd::Push => {
            let remote = cfg.remote.clone().ok_or_else(not_configured)?;
            let stats = crate::remote::push(db, &remote)?;
            println!(
                "Pushed {} queued writes ({} still queued).",
                stats.pushed, stats.remaining
            );
        }
    }
    Ok(())
}

fn print_table<S: AsRef<str>>(headers: &[S], rows: &[Vec<String>]) {
    if headers.is_empty() {
        println!("(no columns)");
        return;
    }

    let cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h.as_ref())).collect();

    for row in rows {
        for (i, cell) in row.iter().take(cols).enumerate() {
            widths[i] = widths[i].max(display_width(cell));
        }
    }

    fn print_row(cells: &[String], widths: &[usize]) {
        print!("|");
        for (i, w) in widths.iter().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            let pad = w.saturating_sub(display_width(cell));
            print!(" {cell}{} |", " ".repeat(pad));
        }
        println!();
    }

    fn print_sep(widths: &[usize]) {
        print!("|");
        for w in widths {
            print!("{}|", "-".repeat(w + 2));
        }
        println!();
    }

    let header_cells: Vec<String> = headers.iter().map(|h| h.as_ref().to_string()).collect();
    print_row(&header_cells, &widths);
    print_sep(&widths);
    for row in rows {
        print_row(row, &widths);
    }
}

/// Column width in chars; Bengali names would be overcounted by byte length.
fn display_width(s: &str) -> usize {
    s.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraph_argument_parses_with_optional_amounts() {
        let p = parse_paragraph("12:partial:1000:500:200").unwrap();
        assert_eq!(p.number, "12");
        assert_eq!(p.status, ParagraphStatus::PartiallySettled);
        assert_eq!(p.settled_amount(), Decimal::from(700));

        let p = parse_paragraph("৩:full").unwrap();
        assert_eq!(p.status, ParagraphStatus::FullySettled);
        assert_eq!(p.involved_amount, Decimal::ZERO);

        assert!(parse_paragraph("3").is_err());
        assert!(parse_paragraph("3:maybe").is_err());
        assert!(parse_paragraph("3:full:abc").is_err());
    }
}
