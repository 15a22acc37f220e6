//! wherry - file operations for a terminal file manager, from the shell.
//!
//! Usage:
//!   wherry cp <SOURCES>... <DEST>    Copy files and trees
//!   wherry mv <SOURCES>... <DEST>    Move files and trees
//!   wherry rm <TARGETS>...           Delete files and trees
//!   wherry ls [PATH]                 Show a sorted listing
//!   wherry --help                    Show help

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, bail};
use is_terminal::IsTerminal;

use wherry_core::{
    DirListing, DirEntry, ErrorChoice, FileProgress, IdentityTransform, ListingFilter, NameOutcome,
    NameTransform, OpError, OperationOptions, OperationUi, PartialChoice, PollChoice,
    RecursiveChoice, ReplaceChoice, SortField, SortOptions, TotalProgress,
};
use wherry_ops::{OperateSpec, OperationKind, operate, operate_in_background, selection,
    selection_totals};
use wherry_vfs::{LocalFs, Metadata, Vfs};

#[derive(Parser)]
#[command(
    name = "wherry",
    version,
    about = "File operations for a terminal file manager",
    long_about = "wherry copies, moves, and deletes files the way an interactive \
                  file manager does: with overwrite confirmation, retryable \
                  errors, and progress reporting."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy files and directory trees
    Cp {
        /// Source paths followed by the destination (sources must share
        /// one parent directory)
        #[arg(required = true, num_args = 2..)]
        paths: Vec<PathBuf>,

        /// Follow symlinks instead of copying them
        #[arg(short = 'L', long)]
        follow_symlinks: bool,

        /// Do not preserve mode, timestamps, or attributes
        #[arg(long)]
        no_preserve: bool,

        /// Preserve owner and group (needs privileges)
        #[arg(short = 'o', long)]
        preserve_owner: bool,

        /// Rewrite relative symlink targets for the new location
        #[arg(short = 's', long)]
        stable_symlinks: bool,

        /// Nest into an existing destination directory of the same name
        #[arg(long)]
        dive: bool,

        /// Default answer for existing destinations
        #[arg(long, value_enum)]
        overwrite: Option<OverwriteArg>,

        /// Run in a background worker
        #[arg(short = 'b', long)]
        background: bool,
    },

    /// Move files and directory trees
    Mv {
        /// Source paths followed by the destination (sources must share
        /// one parent directory)
        #[arg(required = true, num_args = 2..)]
        paths: Vec<PathBuf>,

        /// Delete sources only after the whole tree is copied
        #[arg(long)]
        erase_at_end: bool,

        /// Default answer for existing destinations
        #[arg(long, value_enum)]
        overwrite: Option<OverwriteArg>,

        /// Run in a background worker
        #[arg(short = 'b', long)]
        background: bool,
    },

    /// Delete files and directory trees
    Rm {
        /// Paths to delete (must share one parent directory)
        #[arg(required = true)]
        targets: Vec<PathBuf>,

        /// Delete non-empty directories without asking
        #[arg(short, long)]
        recursive: bool,

        /// No confirmation prompt, ignore errors
        #[arg(short, long)]
        force: bool,

        /// Run in a background worker
        #[arg(short = 'b', long)]
        background: bool,
    },

    /// Show a sorted directory listing
    Ls {
        /// Directory to list
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Sort key
        #[arg(short, long, value_enum, default_value = "name")]
        sort: SortArg,

        /// Reverse the order (directories still come first)
        #[arg(short, long)]
        reverse: bool,

        /// Case-sensitive name comparison
        #[arg(short = 'c', long)]
        case_sensitive: bool,

        /// Mix directories and files instead of partitioning
        #[arg(short, long)]
        mix: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SortArg {
    Unsorted,
    Name,
    Extension,
    Size,
    Mtime,
    Atime,
    Ctime,
    Inode,
    Version,
}

impl From<SortArg> for SortField {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Unsorted => SortField::Unsorted,
            SortArg::Name => SortField::Name,
            SortArg::Extension => SortField::Extension,
            SortArg::Size => SortField::Size,
            SortArg::Mtime => SortField::ModifyTime,
            SortArg::Atime => SortField::AccessTime,
            SortArg::Ctime => SortField::ChangeTime,
            SortArg::Inode => SortField::Inode,
            SortArg::Version => SortField::Version,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OverwriteArg {
    Always,
    Never,
    Update,
}

impl From<OverwriteArg> for ReplaceChoice {
    fn from(arg: OverwriteArg) -> Self {
        match arg {
            OverwriteArg::Always => ReplaceChoice::Always,
            OverwriteArg::Never => ReplaceChoice::Never,
            OverwriteArg::Update => ReplaceChoice::Update,
        }
    }
}

fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Cp {
            mut paths,
            follow_symlinks,
            no_preserve,
            preserve_owner,
            stable_symlinks,
            dive,
            overwrite,
            background,
        } => {
            let dest = paths.pop().unwrap_or_default();
            let opts = OperationOptions {
                follow_symlinks,
                preserve: !no_preserve,
                preserve_owner,
                stable_symlinks,
                dive_into_subdirs: dive,
                ..OperationOptions::default()
            };
            run_transfer(
                OperationKind::Copy,
                &paths,
                &dest,
                opts,
                overwrite,
                background,
            )
        }
        Command::Mv {
            mut paths,
            erase_at_end,
            overwrite,
            background,
        } => {
            let dest = paths.pop().unwrap_or_default();
            let opts = OperationOptions {
                erase_at_end,
                ..OperationOptions::default()
            };
            run_transfer(
                OperationKind::Move,
                &paths,
                &dest,
                opts,
                overwrite,
                background,
            )
        }
        Command::Rm {
            targets,
            recursive,
            force,
            background,
        } => run_delete(&targets, recursive, force, background),
        Command::Ls {
            path,
            sort,
            reverse,
            case_sensitive,
            mix,
        } => run_ls(&path, sort.into(), reverse, case_sensitive, mix),
    }
}

fn run_transfer(
    kind: OperationKind,
    sources: &[PathBuf],
    dest: &Path,
    opts: OperationOptions,
    overwrite: Option<OverwriteArg>,
    background: bool,
) -> Result<()> {
    let fs = LocalFs::new();
    let (cwd, listing) = build_selection(&fs, sources)?;

    // An existing directory receives the sources under their own names;
    // otherwise a single source is renamed onto the destination.
    let (dest_dir, transform): (PathBuf, Arc<dyn NameTransform + Send + Sync>) =
        if fs.stat(dest).is_ok_and(|m| m.is_dir()) {
            (dest.to_path_buf(), Arc::new(IdentityTransform))
        } else if sources.len() == 1 {
            let name = match dest.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => bail!("invalid destination: {}", dest.display()),
            };
            let parent = match dest.parent() {
                Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
                _ => PathBuf::from("."),
            };
            (parent, Arc::new(RenameTo { name }))
        } else {
            bail!("destination must be an existing directory: {}", dest.display());
        };

    let spec = OperateSpec {
        kind,
        cwd,
        dest: Some(dest_dir),
        force_single: false,
        selected: 0,
    };

    let mut ui = ConsoleUi::new(overwrite.map(Into::into), None, false);
    let changed = run_operation(fs, listing, spec, opts, transform, &mut ui, background)?;
    report_outcome(kind, changed, &ui);
    Ok(())
}

fn run_delete(targets: &[PathBuf], recursive: bool, force: bool, background: bool) -> Result<()> {
    let fs = LocalFs::new();
    let (cwd, listing) = build_selection(&fs, targets)?;

    let spec = OperateSpec {
        kind: OperationKind::Delete,
        cwd: cwd.clone(),
        dest: None,
        force_single: false,
        selected: 0,
    };

    // The confirmation prompt is built from the selection totals, the way
    // a panel would phrase it.
    if !force && std::io::stdin().is_terminal() {
        let items = selection(&listing, &spec);
        let (files, bytes) = selection_totals(&fs, &listing, &cwd, &items);
        eprint!(
            "Delete {} entries ({} files, {})? [y/N] ",
            items.len(),
            files,
            humansize::format_size(bytes, humansize::BINARY)
        );
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        if !matches!(line.trim(), "y" | "Y" | "yes") {
            return Ok(());
        }
    }

    let recursive_default = if recursive || force {
        Some(RecursiveChoice::All)
    } else {
        None
    };
    let mut ui = ConsoleUi::new(None, recursive_default, force);
    let changed = run_operation(
        fs,
        listing,
        spec,
        OperationOptions::default(),
        Arc::new(IdentityTransform),
        &mut ui,
        background,
    )?;
    report_outcome(OperationKind::Delete, changed, &ui);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_operation(
    fs: LocalFs,
    mut listing: DirListing,
    spec: OperateSpec,
    opts: OperationOptions,
    transform: Arc<dyn NameTransform + Send + Sync>,
    ui: &mut ConsoleUi,
    background: bool,
) -> Result<bool> {
    if background {
        let op = operate_in_background(Arc::new(fs), listing, spec, opts, transform)?;
        let (changed, _listing) = op.drive(ui);
        Ok(changed)
    } else {
        Ok(operate(&fs, &mut listing, &spec, opts, transform.as_ref(), ui))
    }
}

fn run_ls(
    path: &Path,
    field: SortField,
    reverse: bool,
    case_sensitive: bool,
    mix: bool,
) -> Result<()> {
    let fs = LocalFs::new();
    let mut listing = DirListing::new();
    let opts = SortOptions {
        reverse,
        case_sensitive,
        mix_all_files: mix,
    };
    listing.load(&fs, path, &ListingFilter::accept_all(), field, &opts)?;

    let mut stdout = std::io::stdout().lock();
    for entry in listing.iter() {
        let marker = if entry.is_dot_dot() || entry.meta.is_dir() {
            "/"
        } else if entry.flags.stale_link {
            "!"
        } else if entry.meta.is_symlink() {
            "@"
        } else {
            ""
        };
        writeln!(
            stdout,
            "{:>10}  {}{}",
            humansize::format_size(entry.meta.size, humansize::BINARY),
            entry.name,
            marker
        )?;
    }
    Ok(())
}

fn report_outcome(kind: OperationKind, changed: bool, ui: &ConsoleUi) {
    if changed {
        eprintln!(
            "{} done ({} completed{})",
            kind,
            ui.completed(),
            if ui.had_errors() { ", with errors" } else { "" }
        );
    } else {
        eprintln!("{kind}: nothing done");
    }
}

/// Build a one-directory listing with every given path marked, the way a
/// panel selection would look.
fn build_selection(fs: &LocalFs, paths: &[PathBuf]) -> Result<(PathBuf, DirListing)> {
    let parent_of = |p: &Path| -> PathBuf {
        match p.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    };

    let Some(first) = paths.first() else {
        bail!("no sources given");
    };
    let cwd = parent_of(first);
    let mut listing = DirListing::new();

    for path in paths {
        if parent_of(path) != cwd {
            bail!("sources must share one parent directory");
        }
        let Some(name) = path.file_name() else {
            bail!("cannot operate on {}", path.display());
        };
        let meta = fs.lstat(path)?;
        let mut link_to_dir = false;
        let mut stale_link = false;
        if meta.is_symlink() {
            match fs.stat(path) {
                Ok(target) => link_to_dir = target.is_dir(),
                Err(_) => stale_link = true,
            }
        }
        let mut entry = DirEntry::new(
            name.to_string_lossy().into_owned(),
            meta,
            link_to_dir,
            stale_link,
        );
        entry.flags.marked = true;
        listing.append(entry);
    }

    Ok((cwd, listing))
}

/// Renames a single source onto a fixed destination name.
struct RenameTo {
    name: String,
}

impl NameTransform for RenameTo {
    fn apply(&self, _source_name: &str) -> NameOutcome {
        NameOutcome::Name(self.name.clone())
    }
}

/// Console collaborator: prompts on stderr, reads answers from stdin, and
/// falls back to safe defaults when not attached to a terminal.
struct ConsoleUi {
    interactive: bool,
    overwrite_default: Option<ReplaceChoice>,
    recursive_default: Option<RecursiveChoice>,
    ignore_errors: bool,
    completed: u64,
    errors: u64,
}

impl ConsoleUi {
    fn new(
        overwrite_default: Option<ReplaceChoice>,
        recursive_default: Option<RecursiveChoice>,
        ignore_errors: bool,
    ) -> Self {
        Self {
            interactive: std::io::stdin().is_terminal(),
            overwrite_default,
            recursive_default,
            ignore_errors,
            completed: 0,
            errors: 0,
        }
    }

    fn completed(&self) -> u64 {
        self.completed
    }

    fn had_errors(&self) -> bool {
        self.errors > 0
    }

    /// One-letter prompt; `None` when not interactive.
    fn prompt(&self, text: &str, choices: &str) -> Option<char> {
        if !self.interactive {
            return None;
        }
        eprint!("{text} {choices} ");
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).ok()?;
        line.trim().chars().next().map(|c| c.to_ascii_lowercase())
    }
}

impl OperationUi for ConsoleUi {
    fn show_source(&mut self, _path: Option<&Path>) {}

    fn show_target(&mut self, _path: Option<&Path>) {}

    fn show_deleting(&mut self, path: &Path) {
        eprintln!("deleting {}", path.display());
    }

    fn show_file_progress(&mut self, _progress: &FileProgress) {}

    fn show_total_progress(&mut self, progress: &TotalProgress) {
        self.completed = progress.files_done;
    }

    fn poll(&mut self) -> PollChoice {
        PollChoice::Continue
    }

    fn report(&mut self, error: &OpError, retryable: bool) -> ErrorChoice {
        self.errors += 1;
        eprintln!("{error}");
        if self.ignore_errors {
            return ErrorChoice::Ignore;
        }
        let choices = if retryable {
            "[i]gnore / ignore [a]ll / [r]etry / a[b]ort?"
        } else {
            "[i]gnore / ignore [a]ll / a[b]ort?"
        };
        match self.prompt("", choices) {
            Some('i') => ErrorChoice::Ignore,
            Some('a') => ErrorChoice::IgnoreAll,
            Some('r') if retryable => ErrorChoice::Retry,
            Some(_) | None => ErrorChoice::Abort,
        }
    }

    fn note(&mut self, message: &str) {
        eprintln!("{message}");
    }

    fn confirm_overwrite(
        &mut self,
        _source: &Path,
        source_meta: &Metadata,
        dest: &Path,
        dest_meta: &Metadata,
    ) -> ReplaceChoice {
        if let Some(default) = self.overwrite_default {
            return default;
        }
        let text = format!(
            "overwrite {} ({} -> {} bytes)?",
            dest.display(),
            dest_meta.size,
            source_meta.size
        );
        match self.prompt(
            &text,
            "[y]es / [n]o / [A]ll / [N]one / [u]pdate / [s]ize-differs / a[p]pend / [r]esume / a[b]ort?",
        ) {
            Some('y') => ReplaceChoice::Yes,
            Some('a') => ReplaceChoice::Always,
            Some('u') => ReplaceChoice::Update,
            Some('s') => ReplaceChoice::IfSizeDiffers,
            Some('p') => ReplaceChoice::Append,
            Some('r') => ReplaceChoice::Reget,
            Some('b') => ReplaceChoice::Abort,
            Some(_) => ReplaceChoice::No,
            None => ReplaceChoice::No,
        }
    }

    fn confirm_recursive_delete(&mut self, path: &Path) -> RecursiveChoice {
        if let Some(default) = self.recursive_default {
            return default;
        }
        let text = format!("directory {} is not empty; delete recursively?", path.display());
        match self.prompt(&text, "[y]es / [n]o / [A]ll / [N]one / a[b]ort?") {
            Some('y') => RecursiveChoice::Yes,
            Some('a') => RecursiveChoice::All,
            Some('b') => RecursiveChoice::Abort,
            Some(_) | None => RecursiveChoice::No,
        }
    }

    fn confirm_partial(&mut self, dest: &Path) -> PartialChoice {
        let text = format!(
            "incomplete file {} was retrieved; keep it?",
            dest.display()
        );
        match self.prompt(&text, "[k]eep / [d]elete?") {
            Some('d') => PartialChoice::Delete,
            _ => PartialChoice::Keep,
        }
    }
}
