use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use vibe_config::Config;
use vibe_core::confirm::{Confirm, NonInteractive, StashDecision};
use vibe_core::context::CommandContext;
use vibe_core::template::SectionValues;
use vibe_core::{ci, issues, sprint, workflow};
use vibe_types::{Issue, IssueFields, IssueState, PullRequest, Ticket, VibeError};

/// Subcommand names `workon` dispatch skips when rewriting a bare
/// `<ticket-id>` invocation (spec §6: "A bare `<ticket-id>` as the sole
/// argument is dispatched as `workon <ticket-id>`").
const KNOWN_COMMANDS: &[&str] = &[
    "init",
    "workon",
    "start",
    "ticket",
    "comment",
    "branch",
    "pr",
    "pr-status",
    "pr-update",
    "merge",
    "ci-status",
    "ci-failure",
    "issues",
    "issue",
    "issue-create",
    "issue-update",
    "help",
    "-h",
    "--help",
    "-V",
    "--version",
];

#[derive(Parser, Debug)]
#[command(name = "vibe", version, about = "Stitches a task tracker, a hosting platform, and CI into a ticket-to-merge pipeline")]
struct Cli {
    /// Load config from this path instead of discovering a local override.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a config file.
    Init {
        #[arg(long)]
        local: bool,
        #[arg(long)]
        force: bool,
        #[arg(long)]
        install_skills: bool,
    },
    /// Fetch ticket, branch, transition status.
    Workon { ticket_id: String },
    /// Interactive ticket selection.
    Start { query: Option<String> },
    /// Display a ticket.
    Ticket { ticket_id: Option<String> },
    /// Add a tracker comment.
    Comment { text: Vec<String> },
    /// Create a branch without a tracker status transition.
    Branch { ticket_id: Option<String> },
    /// Create a PR.
    Pr {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        summary: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        testing: Option<String>,
        #[arg(long)]
        draft: bool,
        #[arg(long)]
        base: Option<String>,
        #[arg(long = "body-file")]
        body_file: Option<PathBuf>,
        #[arg(long)]
        yes: bool,
        #[arg(long)]
        ai: bool,
    },
    /// Display PR status.
    PrStatus { pr_number: Option<u64> },
    /// Section-wise PR update.
    PrUpdate {
        pr_number: Option<u64>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        summary: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        testing: Option<String>,
    },
    /// Post a `/merge` comment.
    Merge { pr_number: Option<u64> },
    /// Aggregate CI status.
    CiStatus { branch: Option<String> },
    /// Detailed CI failure output.
    CiFailure {
        job_number: Option<u64>,
        #[arg(long)]
        branch: Option<String>,
    },
    /// List issues.
    Issues {
        #[arg(long, value_enum, default_value = "open")]
        state: IssueStateArg,
        #[arg(long)]
        limit: Option<usize>,
        /// Interactive picker; left to this binary, not vibe-core (spec §1
        /// Non-goals).
        #[arg(long)]
        select: bool,
    },
    /// Display an issue.
    Issue {
        number: Option<u64>,
        #[arg(long)]
        comments: bool,
    },
    /// Create an issue.
    IssueCreate {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
        #[arg(long = "body-file")]
        body_file: Option<PathBuf>,
        #[arg(long, value_delimiter = ',')]
        assignees: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,
        #[arg(long)]
        milestone: Option<String>,
        #[arg(long, value_delimiter = ',')]
        projects: Vec<String>,
        #[arg(long)]
        yes: bool,
    },
    /// Update an issue.
    IssueUpdate {
        number: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
        #[arg(long = "body-file")]
        body_file: Option<PathBuf>,
        #[arg(long, value_delimiter = ',')]
        assignees: Vec<String>,
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,
        #[arg(long)]
        milestone: Option<String>,
        #[arg(long, value_delimiter = ',')]
        projects: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum IssueStateArg {
    Open,
    Closed,
    All,
}

impl From<IssueStateArg> for IssueState {
    fn from(value: IssueStateArg) -> Self {
        match value {
            IssueStateArg::Open => IssueState::Open,
            IssueStateArg::Closed => IssueState::Closed,
            IssueStateArg::All => IssueState::All,
        }
    }
}

/// Prints info/warn/error to stderr, keeping stdout reserved for command
/// output a user might pipe or redirect.
trait Reporter {
    fn info(&self, message: &str);
    fn warn(&self, message: &str);
    fn error(&self, message: &str);
}

struct CliReporter {
    debug: bool,
}

impl Reporter for CliReporter {
    fn info(&self, message: &str) {
        if self.debug {
            eprintln!("[info] {message}");
        }
    }

    fn warn(&self, message: &str) {
        eprintln!("[warn] {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("[error] {message}");
    }
}

/// Prompts on stdin/stderr. Used whenever a command hasn't been told
/// `--yes`.
struct TerminalConfirm;

impl Confirm for TerminalConfirm {
    fn confirm(&self, message: &str) -> bool {
        eprint!("{message} [y/N] ");
        let _ = io::stderr().flush();
        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_lowercase().as_str(), "y" | "yes")
    }

    fn stash_or_cancel(&self, message: &str) -> StashDecision {
        eprint!("{message} [s]tash/[c]ancel ");
        let _ = io::stderr().flush();
        let mut line = String::new();
        if io::stdin().read_line(&mut line).is_err() {
            return StashDecision::Cancel;
        }
        match line.trim().to_lowercase().as_str() {
            "s" | "stash" => StashDecision::Stash,
            _ => StashDecision::Cancel,
        }
    }
}

fn confirm_for(yes: bool) -> Box<dyn Confirm> {
    if yes {
        Box::new(NonInteractive)
    } else {
        Box::new(TerminalConfirm)
    }
}

fn main() {
    let args = effective_args();
    let cli = Cli::parse_from(args);
    let reporter = CliReporter { debug: cli.debug };

    if let Err(err) = run(cli, &reporter) {
        reporter.error(&err.to_string());
        std::process::exit(err.exit_code());
    }
}

/// Rewrite `vibe <ticket-id>` into `vibe workon <ticket-id>` (spec §6).
/// Only fires for a sole non-flag argument that isn't a recognised
/// subcommand name, so `vibe --config x.yaml workon abc123xyz` and
/// ordinary subcommand invocations pass through untouched.
fn effective_args() -> Vec<String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() == 2 && !args[1].starts_with('-') && !KNOWN_COMMANDS.contains(&args[1].as_str()) {
        let mut rewritten = args;
        rewritten.insert(1, "workon".to_string());
        return rewritten;
    }
    args
}

fn run(cli: Cli, reporter: &dyn Reporter) -> Result<(), VibeError> {
    let repo_root = std::env::current_dir().map_err(|e| VibeError::Other(e.into()))?;

    // `init` bootstraps the config file itself, so it must not require one
    // (or a working copy, or hosting credentials) to already exist.
    if let Commands::Init { local, force, install_skills } = cli.command {
        return cmd_init(&repo_root, local, force, install_skills, reporter);
    }

    let config = load_effective_config(&repo_root, cli.config.as_deref(), cli.debug)?;
    let ctx = CommandContext::new(config, &repo_root)?;

    match cli.command {
        Commands::Init { .. } => unreachable!("handled above"),
        Commands::Workon { ticket_id } => cmd_workon(&ctx, &ticket_id),
        Commands::Start { query } => cmd_start(&ctx, query.as_deref()),
        Commands::Ticket { ticket_id } => cmd_ticket(&ctx, ticket_id.as_deref()),
        Commands::Comment { text } => cmd_comment(&ctx, &text),
        Commands::Branch { ticket_id } => cmd_branch(&ctx, ticket_id.as_deref()),
        Commands::Pr {
            title,
            summary,
            description,
            testing,
            draft,
            base,
            body_file,
            yes,
            ai,
        } => cmd_pr(&ctx, title, summary, description, testing, draft, base, body_file, yes, ai),
        Commands::PrStatus { pr_number } => cmd_pr_status(&ctx, pr_number),
        Commands::PrUpdate {
            pr_number,
            title,
            summary,
            description,
            testing,
        } => cmd_pr_update(&ctx, pr_number, title, summary, description, testing),
        Commands::Merge { pr_number } => cmd_merge(&ctx, pr_number),
        Commands::CiStatus { branch } => cmd_ci_status(&ctx, branch.as_deref()),
        Commands::CiFailure { job_number, branch } => cmd_ci_failure(&ctx, branch.as_deref(), job_number),
        Commands::Issues { state, limit, select } => cmd_issues(&ctx, state, limit, select),
        Commands::Issue { number, comments } => cmd_issue(&ctx, number, comments),
        Commands::IssueCreate {
            title,
            body,
            body_file,
            assignees,
            labels,
            milestone,
            projects,
            yes,
        } => cmd_issue_create(&ctx, title, body, body_file, assignees, labels, milestone, projects, yes),
        Commands::IssueUpdate {
            number,
            title,
            body,
            body_file,
            assignees,
            labels,
            milestone,
            projects,
        } => cmd_issue_update(&ctx, number, title, body, body_file, assignees, labels, milestone, projects),
    }
}

/// Layer config tiers per spec §4.3, with an explicit `--config` path
/// replacing the local-file-discovery tier rather than the global one.
fn load_effective_config(start_dir: &Path, explicit_local: Option<&Path>, debug_flag: bool) -> Result<Config, VibeError> {
    let to_vibe_error = |e: anyhow::Error| VibeError::configuration("config", "load", e.to_string());

    let mut cli_overrides = Config::default();
    cli_overrides.debug = debug_flag;

    let config = match explicit_local {
        Some(path) => {
            let mut config = Config::default();
            if let Some(global_path) = vibe_config::global_config_path() {
                config = config.merge(&vibe_config::load_config_file(&global_path).map_err(to_vibe_error)?);
            }
            config = config.merge(&vibe_config::load_config_file(path).map_err(to_vibe_error)?);
            config = config.apply_env();
            config.merge(&cli_overrides)
        }
        None => vibe_config::load(start_dir, &cli_overrides).map_err(to_vibe_error)?,
    };

    Ok(config)
}

fn cmd_init(repo_root: &Path, local: bool, force: bool, install_skills: bool, reporter: &dyn Reporter) -> Result<(), VibeError> {
    let path = if local {
        repo_root.join(".vibe.yaml")
    } else {
        vibe_config::global_config_path()
            .ok_or_else(|| VibeError::configuration("config", "path", "could not determine a user config directory"))?
    };

    if path.exists() && !force {
        return Err(VibeError::Conflict(format!(
            "{} already exists; pass --force to overwrite",
            path.display()
        )));
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| VibeError::Other(e.into()))?;
    }

    vibe_config::save_config(&path, &Config::default()).map_err(|e| VibeError::configuration("config", "save", e.to_string()))?;
    println!("wrote {}", path.display());

    if install_skills {
        reporter.warn("--install-skills is handled outside this binary; no embedded skill assets were written");
    }

    Ok(())
}

fn cmd_workon(ctx: &CommandContext, ticket_id: &str) -> Result<(), VibeError> {
    let outcome = workflow::workon(ctx, confirm_for(false).as_ref(), ticket_id)?;
    println!("checked out {}", outcome.branch);
    println!("{}: {}", outcome.ticket.id, outcome.ticket.title);
    if outcome.status_transitioned {
        println!("ticket status transitioned to '{}'", ctx.config.defaults.status);
    }
    Ok(())
}

fn cmd_start(ctx: &CommandContext, query: Option<&str>) -> Result<(), VibeError> {
    let candidates = match query {
        Some(query) if vibe_validate::is_ticket_id(query) => return cmd_workon(ctx, query),
        Some(query) => workflow::search_candidates(ctx, query)?,
        None => {
            let folder = sprint::resolve_sprint_folder(ctx, None)?;
            ctx.tracker.list_tasks(&folder.id, &vibe_tracker::TaskFilters::default())?
        }
    };

    if candidates.is_empty() {
        println!("no tickets found");
        return Ok(());
    }
    for ticket in &candidates {
        println!("{}  {}", ticket.id, ticket.title);
    }
    println!("pass one of the IDs above to `vibe workon` to continue");
    Ok(())
}

fn cmd_ticket(ctx: &CommandContext, ticket_id: Option<&str>) -> Result<(), VibeError> {
    let ticket = workflow::get_ticket(ctx, ticket_id)?;
    print_ticket(&ticket);
    Ok(())
}

fn cmd_comment(ctx: &CommandContext, text: &[String]) -> Result<(), VibeError> {
    let text = read_text_or_stdin(text)?;
    let ticket_id = workflow::add_comment(ctx, None, &text)?;
    println!("added comment to {ticket_id}");
    Ok(())
}

fn cmd_branch(ctx: &CommandContext, ticket_id: Option<&str>) -> Result<(), VibeError> {
    let ticket_id = ticket_id
        .map(str::to_string)
        .or_else(|| ctx.git.current_branch().ok().flatten().and_then(|b| vibe_validate::extract_ticket_id(&b)))
        .ok_or_else(|| VibeError::validation("ticket_id", "", "branch needs a ticket ID, given or recoverable from the current branch"))?;
    let branch = workflow::branch_only(ctx, confirm_for(false).as_ref(), &ticket_id)?;
    println!("checked out {branch}");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_pr(
    ctx: &CommandContext,
    title: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    testing: Option<String>,
    draft: bool,
    base: Option<String>,
    body_file: Option<PathBuf>,
    yes: bool,
    ai: bool,
) -> Result<(), VibeError> {
    let body = body_file.map(read_file_to_string).transpose()?;

    let ticket_url = ctx
        .git
        .current_branch()
        .ok()
        .flatten()
        .and_then(|b| vibe_validate::extract_ticket_id(&b))
        .and_then(|id| ctx.tracker.get_task(&id).ok())
        .map(|t| t.url);

    let opts = workflow::PrCreateOptions {
        title,
        body,
        sections: SectionValues { summary, description, testing },
        draft,
        base,
        yes,
        ai,
        ticket_url,
    };

    let pr = workflow::create_pr(ctx, confirm_for(yes).as_ref(), opts, |body| {
        println!("--- proposed PR body ---\n{body}\n------------------------");
    })?;
    print_pr(&pr);
    Ok(())
}

fn cmd_pr_status(ctx: &CommandContext, pr_number: Option<u64>) -> Result<(), VibeError> {
    let (pr, status) = workflow::pr_status(ctx, pr_number)?;
    print_pr(&pr);
    println!(
        "approved={} changes_requested={} commented={} review_pending={} checks_passed={} checks_failed={} checks_pending={}",
        status.approved,
        status.changes_requested,
        status.commented,
        status.review_pending,
        status.checks_passed,
        status.checks_failed,
        status.checks_pending
    );
    println!("ready_to_merge={}", status.is_ready_to_merge());
    Ok(())
}

fn cmd_pr_update(
    ctx: &CommandContext,
    pr_number: Option<u64>,
    title: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    testing: Option<String>,
) -> Result<(), VibeError> {
    let sections = SectionValues { summary, description, testing };
    let pr = workflow::update_pr(ctx, pr_number, &sections, title)?;
    print_pr(&pr);
    Ok(())
}

fn cmd_merge(ctx: &CommandContext, pr_number: Option<u64>) -> Result<(), VibeError> {
    workflow::merge(ctx, confirm_for(false).as_ref(), pr_number)?;
    println!("posted /merge");
    Ok(())
}

fn cmd_ci_status(ctx: &CommandContext, branch: Option<&str>) -> Result<(), VibeError> {
    let status = ci::ci_status(ctx, branch)?;
    println!("branch={} pipeline=#{}", status.branch, status.pipeline_number);
    for workflow in &status.workflows {
        println!("  workflow {} [{:?}]", workflow.name, workflow.status);
        for job in &workflow.jobs {
            println!("    job {} (#{}) [{:?}]", job.name, job.number, job.status);
        }
    }
    if status.failed_jobs.is_empty() {
        println!("no failed jobs");
    } else {
        for failed in &status.failed_jobs {
            println!("FAILED {}/{} (#{})", failed.workflow_name, failed.job_name, failed.job_number);
            for test in &failed.failed_tests {
                println!("  - {}", test.name);
            }
        }
    }
    Ok(())
}

fn cmd_ci_failure(ctx: &CommandContext, branch: Option<&str>, job_number: Option<u64>) -> Result<(), VibeError> {
    let detail = ci::ci_failure(ctx, branch, job_number)?;
    println!("build #{}", detail.build_number);
    for step in &detail.steps {
        println!("-- {} [{:?}] --", step.name, step.status);
        if let Some(output) = &step.output {
            println!("{output}");
        }
    }
    Ok(())
}

fn cmd_issues(ctx: &CommandContext, state: IssueStateArg, limit: Option<usize>, select: bool) -> Result<(), VibeError> {
    let list = issues::list_issues(ctx, state.into(), limit)?;
    if select {
        eprintln!("note: --select is an interactive picker, left to the caller's terminal layer; listing instead");
    }
    for issue in &list {
        println!("#{}  {}  [{}]", issue.number, issue.title, issue.state);
    }
    Ok(())
}

fn cmd_issue(ctx: &CommandContext, number: Option<u64>, comments: bool) -> Result<(), VibeError> {
    let number = match number {
        Some(number) => number,
        None => {
            let branch = ctx.git.current_branch().ok().flatten().unwrap_or_default();
            let recovered = vibe_validate::extract_issue_number_from_branch(&branch);
            if recovered == 0 {
                return Err(VibeError::validation(
                    "number",
                    "",
                    "no issue number given and none could be recovered from the current branch",
                ));
            }
            recovered
        }
    };
    let issue = issues::get_issue(ctx, number, comments)?;
    print_issue(&issue);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_issue_create(
    ctx: &CommandContext,
    title: Option<String>,
    body: Option<String>,
    body_file: Option<PathBuf>,
    assignees: Vec<String>,
    labels: Vec<String>,
    milestone: Option<String>,
    projects: Vec<String>,
    yes: bool,
) -> Result<(), VibeError> {
    let body = match body_file {
        Some(path) => Some(read_file_to_string(path)?),
        None => body,
    };

    let fields = IssueFields {
        title,
        body,
        state: None,
        assignees: non_empty_vec(assignees),
        labels: non_empty_vec(labels),
        milestone,
        projects: non_empty_vec(projects),
    };

    let issue = issues::create_issue(ctx, confirm_for(yes).as_ref(), fields, yes)?;
    print_issue(&issue);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_issue_update(
    ctx: &CommandContext,
    number: u64,
    title: Option<String>,
    body: Option<String>,
    body_file: Option<PathBuf>,
    assignees: Vec<String>,
    labels: Vec<String>,
    milestone: Option<String>,
    projects: Vec<String>,
) -> Result<(), VibeError> {
    let body = match body_file {
        Some(path) => Some(read_file_to_string(path)?),
        None => body,
    };

    let fields = IssueFields {
        title,
        body,
        state: None,
        assignees: non_empty_vec(assignees),
        labels: non_empty_vec(labels),
        milestone,
        projects: non_empty_vec(projects),
    };

    let issue = issues::update_issue(ctx, number, &fields)?;
    print_issue(&issue);
    Ok(())
}

fn non_empty_vec(v: Vec<String>) -> Option<Vec<String>> {
    if v.is_empty() {
        None
    } else {
        Some(v)
    }
}

fn read_file_to_string(path: PathBuf) -> Result<String, VibeError> {
    std::fs::read_to_string(&path).map_err(|e| VibeError::configuration("body-file", path.display().to_string(), e.to_string()))
}

/// `comment <text…>`: join variadic words, or read stdin when no words
/// were given (spec §6: "variadic / stdin").
fn read_text_or_stdin(text: &[String]) -> Result<String, VibeError> {
    if !text.is_empty() {
        return Ok(text.join(" "));
    }
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| VibeError::Other(e.into()))?;
    let buf = buf.trim().to_string();
    if buf.is_empty() {
        return Err(VibeError::validation("text", "", "comment requires text as arguments or on stdin"));
    }
    Ok(buf)
}

fn print_ticket(ticket: &Ticket) {
    println!("{}: {}", ticket.id, ticket.title);
    println!("status: {}", ticket.status);
    println!("url: {}", ticket.url);
    if !ticket.description.is_empty() {
        println!("\n{}", ticket.description);
    }
    for comment in &ticket.comments {
        println!("\n[{}] {}: {}", comment.created_at, comment.author, comment.body);
    }
}

fn print_pr(pr: &PullRequest) {
    println!("#{} {} ({:?}{})", pr.number, pr.title, pr.state, if pr.draft { ", draft" } else { "" });
    println!("{} -> {}", pr.head, pr.base);
    println!("{}", pr.url);
}

fn print_issue(issue: &Issue) {
    println!("#{} {} [{}]", issue.number, issue.title, issue.state);
    println!("{}", issue.url);
    if !issue.labels.is_empty() {
        println!("labels: {}", issue.labels.iter().cloned().collect::<Vec<_>>().join(", "));
    }
    if !issue.body.is_empty() {
        println!("\n{}", issue.body);
    }
    for comment in &issue.comments {
        println!("\n[{}] {}: {}", comment.created_at, comment.author, comment.body);
    }
}
