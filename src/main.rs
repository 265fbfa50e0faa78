use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use sampleshelf::conflicts::{self, ReplaceMap};
use sampleshelf::db::models::{PackUpdate, Sample, SampleUpdate};
use sampleshelf::import::progress::{CancelToken, ImportProgress};
use sampleshelf::import::ImportResult;
use sampleshelf::library::Library;
use sampleshelf::query::{Browser, Filters, Sort, SortKey, TypeFilter};
use sampleshelf::scanner::FolderNode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sampleshelf", version, about = "Local audio sample library manager")]
struct Cli {
    /// Path to the catalog database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Directory imported samples are copied into
    #[arg(long, global = true)]
    library_root: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortArg {
    Filename,
    Bpm,
    Duration,
    Recent,
    Shuffle,
}

impl From<SortArg> for SortKey {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Filename => SortKey::Filename,
            SortArg::Bpm => SortKey::Bpm,
            SortArg::Duration => SortKey::Duration,
            SortArg::Recent => SortKey::Recent,
            SortArg::Shuffle => SortKey::Shuffle,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TypeArg {
    All,
    Oneshot,
    Loop,
}

impl From<TypeArg> for TypeFilter {
    fn from(arg: TypeArg) -> Self {
        match arg {
            TypeArg::All => TypeFilter::All,
            TypeArg::Oneshot => TypeFilter::Oneshot,
            TypeArg::Loop => TypeFilter::Loop,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Show catalog counts and whether a Splice library was found
    Status,

    /// List packs with their sample counts
    Packs,

    /// Browse samples with filters, sorting and paging
    Samples {
        /// Only samples in this pack
        #[arg(long)]
        pack: Option<String>,

        /// Only samples in this playlist
        #[arg(long, conflicts_with = "pack")]
        playlist: Option<i64>,

        /// Text to find in filename, pack name or tags (2+ characters)
        #[arg(short, long, default_value = "")]
        query: String,

        /// Genre (repeatable, any matches)
        #[arg(long)]
        genre: Vec<String>,

        /// Minimum BPM (inclusive)
        #[arg(long)]
        bpm_min: Option<u32>,

        /// Maximum BPM (inclusive)
        #[arg(long)]
        bpm_max: Option<u32>,

        /// Key such as C, F#m (repeatable)
        #[arg(long)]
        key: Vec<String>,

        #[arg(long = "type", value_enum, default_value = "all")]
        sample_type: TypeArg,

        /// Instrument tag (repeatable)
        #[arg(long)]
        instrument: Vec<String>,

        /// Require one of these tags (repeatable)
        #[arg(long)]
        tag: Vec<String>,

        /// Hide samples with any of these tags (repeatable)
        #[arg(long)]
        exclude_tag: Vec<String>,

        #[arg(short, long, value_enum, default_value = "filename")]
        sort: SortArg,

        /// Sort descending
        #[arg(long)]
        desc: bool,

        /// Page number, starting at 1
        #[arg(short, long, default_value = "1")]
        page: usize,

        /// Rows per page (0 = config default)
        #[arg(long, default_value = "0")]
        page_size: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show the audio folder tree under a directory
    ScanFolder {
        path: PathBuf,
    },

    /// Report which pack names already exist
    Conflicts {
        names: Vec<String>,
    },

    /// Copy folders into the library, one pack per folder
    Import {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Replace an existing pack: NAME=UUID (repeatable)
        #[arg(long, value_parser = parse_replace)]
        replace: Vec<(String, String)>,

        /// Replace every existing pack whose name matches a folder
        #[arg(long, conflicts_with = "replace")]
        replace_all: bool,
    },

    /// Import the local Splice library
    ImportSplice,

    /// Compute (or load) a file's waveform
    Waveform {
        path: PathBuf,

        /// Print the full JSON waveform
        #[arg(long)]
        json: bool,
    },

    /// Edit pack fields; blank values keep the current value
    UpdatePack {
        uuid: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        genre: Option<String>,
        #[arg(long)]
        cover_url: Option<String>,
    },

    /// Edit sample fields; blank values keep the current value
    UpdateSample {
        id: i64,
        #[arg(long)]
        filename: Option<String>,
        /// Comma-separated
        #[arg(long)]
        tags: Option<String>,
        #[arg(long)]
        genre: Option<String>,
        /// Pitch class, e.g. F#
        #[arg(long)]
        key: Option<String>,
        /// major or minor
        #[arg(long)]
        chord: Option<String>,
        #[arg(long)]
        bpm: Option<u32>,
        /// oneshot or loop
        #[arg(long = "type")]
        sample_type: Option<String>,
    },

    /// Delete one sample and its file
    DeleteSample {
        id: i64,
    },

    /// Delete a pack, its samples and their files
    DeletePack {
        uuid: String,
    },

    /// Delete every pack and sample
    DeleteAll {
        /// Confirm
        #[arg(long)]
        yes: bool,
    },

    /// Write samples and their metadata to a zip archive
    Export {
        #[arg(short, long)]
        out: PathBuf,

        #[arg(required = true)]
        ids: Vec<i64>,
    },

    /// Manage playlists
    Playlist {
        #[command(subcommand)]
        command: PlaylistCommands,
    },
}

#[derive(Subcommand)]
enum PlaylistCommands {
    /// List playlists, newest first
    List,
    Create {
        name: String,
        #[arg(long)]
        color: Option<String>,
    },
    Rename {
        id: i64,
        name: String,
    },
    /// Set or clear (no value) a playlist's colour
    Color {
        id: i64,
        color: Option<String>,
    },
    Delete {
        id: i64,
    },
    /// Add samples (already present ones are ignored)
    Add {
        id: i64,
        #[arg(required = true)]
        samples: Vec<i64>,
    },
    Remove {
        id: i64,
        #[arg(required = true)]
        samples: Vec<i64>,
    },
}

fn parse_replace(s: &str) -> Result<(String, String), String> {
    match s.rsplit_once('=') {
        Some((name, uuid)) if !name.is_empty() && !uuid.is_empty() => {
            Ok((name.to_string(), uuid.to_string()))
        }
        _ => Err(format!("expected NAME=UUID, got \"{s}\"")),
    }
}

fn progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn import_progress(pb: &ProgressBar) -> impl FnMut(&ImportProgress) + '_ {
    move |p: &ImportProgress| {
        pb.set_length(p.total as u64);
        pb.set_position(p.current as u64);
        pb.set_message(format!(
            "[{}/{}] {} {}",
            p.current_pack, p.total_packs, p.current_pack_name, p.current_file
        ));
    }
}

fn print_import_result(r: &ImportResult) {
    println!(
        "Import {}: {} packs, {} copied, {} skipped ({} failed), {} old files removed",
        if r.cancelled { "cancelled" } else { "complete" },
        r.total_packs,
        r.files_copied,
        r.files_skipped,
        r.files_failed,
        r.files_removed
    );
    if r.packs_failed > 0 {
        println!("{} folders had no audio or could not be read", r.packs_failed);
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

fn print_sample_table(samples: &[Sample]) {
    println!(
        "{:>6}  {:<40} {:>4} {:>4} {:>7} {:<8} {:<20}",
        "ID", "Filename", "BPM", "Key", "Sec", "Type", "Pack"
    );
    println!("{}", "-".repeat(97));

    for s in samples {
        let bpm = s.bpm.map(|b| b.to_string()).unwrap_or_default();
        let secs = s.duration.map(|d| format!("{:.1}", d as f64 / 1000.0)).unwrap_or_default();
        println!(
            "{:>6}  {:<40} {:>4} {:>4} {:>7} {:<8} {:<20}",
            s.id,
            truncate(&s.filename, 40),
            bpm,
            s.formatted_key().unwrap_or_default(),
            secs,
            s.sample_type.as_deref().unwrap_or(""),
            truncate(s.pack_name.as_deref().unwrap_or(""), 20),
        );
    }
}

fn print_tree(node: &FolderNode, depth: usize) {
    println!(
        "{}{} ({} here, {} total)",
        "  ".repeat(depth),
        node.name,
        node.audio_count,
        node.total_audio_count
    );
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing); CLI flags win
    let mut config = sampleshelf::config::AppConfig::load();
    if cli.db_path.is_some() {
        config.db_path = cli.db_path;
    }
    if cli.library_root.is_some() {
        config.library_root = cli.library_root;
    }
    let default_page_size = config.resolve_page_size();

    let lib = Library::open(&config).context("Failed to open library")?;
    log::info!("Library root: {}", lib.library_root().display());

    match cli.command {
        Commands::Status => {
            let status = lib.check_library_status().context("Failed to read catalog")?;
            println!("Packs:    {}", status.pack_count);
            println!("Samples:  {}", status.sample_count);
            println!(
                "Splice:   {}",
                if status.splice_available { "found" } else { "not found" }
            );
        }

        Commands::Packs => {
            let scan = lib.scan_library().context("Failed to list packs")?;
            if scan.packs.is_empty() {
                println!("Library is empty. Import a folder with `sampleshelf import <PATH>`.");
                return Ok(());
            }
            println!("{:<36}  {:<40} {:>7}  {}", "UUID", "Name", "Samples", "Genre");
            println!("{}", "-".repeat(100));
            for p in &scan.packs {
                println!(
                    "{:<36}  {:<40} {:>7}  {}",
                    p.uuid,
                    truncate(&p.name, 40),
                    p.sample_count,
                    p.genre.as_deref().unwrap_or("")
                );
            }
            println!();
            println!("{} packs, {} samples", scan.packs.len(), scan.total_samples);
        }

        Commands::Samples {
            pack,
            playlist,
            query,
            genre,
            bpm_min,
            bpm_max,
            key,
            sample_type,
            instrument,
            tag,
            exclude_tag,
            sort,
            desc,
            page,
            page_size,
            json,
        } => {
            let samples = match (&pack, playlist) {
                (Some(uuid), _) => lib.get_pack_samples(uuid),
                (None, Some(id)) => lib.get_playlist_samples(id),
                (None, None) => lib.get_all_samples(),
            }
            .context("Failed to load samples")?;

            let bpm_range = match (bpm_min, bpm_max) {
                (None, None) => None,
                (min, max) => Some((min.unwrap_or(0), max.unwrap_or(u32::MAX))),
            };
            let mut browser = Browser::new(if page_size > 0 { page_size } else { default_page_size });
            browser.set_filters(Filters {
                query,
                genres: genre.into_iter().collect(),
                bpm_range,
                keys: key.into_iter().collect(),
                sample_type: sample_type.into(),
                instruments: instrument.into_iter().collect(),
                include_tags: tag.into_iter().collect(),
                exclude_tags: exclude_tag.into_iter().collect(),
            });
            browser.set_sort(Sort {
                key: sort.into(),
                descending: desc,
            });
            browser.set_page(page.saturating_sub(1));
            let view = browser.view(&samples);

            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
                return Ok(());
            }
            if view.total == 0 {
                println!("No samples match.");
                return Ok(());
            }
            print_sample_table(&view.items);
            println!();
            println!(
                "Page {}/{} ({} matching of {})",
                view.page + 1,
                view.page_count,
                view.total,
                samples.len()
            );
        }

        Commands::ScanFolder { path } => {
            let tree = lib
                .scan_external_folder(&path)
                .with_context(|| format!("Failed to scan {}", path.display()))?;
            print_tree(&tree, 0);
        }

        Commands::Conflicts { names } => {
            let found = lib.check_pack_name_conflicts(&names).context("Conflict check failed")?;
            if found.is_empty() {
                println!("No conflicts.");
            }
            for c in &found {
                println!("{}  exists as {} ({} samples)", c.name, c.existing_uuid, c.existing_sample_count);
            }
        }

        Commands::Import { paths, replace, replace_all } => {
            let replace_map: ReplaceMap = if replace_all {
                let names: Vec<String> = paths
                    .iter()
                    .filter_map(|p| p.file_name())
                    .map(|n| n.to_string_lossy().to_string())
                    .collect();
                let found = lib.check_pack_name_conflicts(&names).context("Conflict check failed")?;
                conflicts::replace_all(&found)
            } else {
                replace.into_iter().collect()
            };

            let pb = progress_bar()?;
            let result = lib
                .import_external_folder(&paths, &replace_map, &CancelToken::new(), &mut import_progress(&pb))
                .context("Import failed")?;
            pb.finish_and_clear();
            print_import_result(&result);
        }

        Commands::ImportSplice => {
            let pb = progress_bar()?;
            let result = lib
                .import_from_splice(&CancelToken::new(), &mut import_progress(&pb))
                .context("Splice import failed")?;
            pb.finish_and_clear();
            print_import_result(&result);
        }

        Commands::Waveform { path, json } => {
            let waveform = lib
                .get_waveform(&path)
                .with_context(|| format!("No waveform for {}", path.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&*waveform)?);
            } else {
                const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
                let line: String = waveform
                    .peaks
                    .iter()
                    .map(|p| BARS[((p * 7.0).round() as usize).min(7)])
                    .collect();
                println!("{line}");
                println!("{:.2}s, {} peaks", waveform.duration_secs, waveform.peaks.len());
            }
        }

        Commands::UpdatePack { uuid, name, genre, cover_url } => {
            let pack = lib
                .update_pack(&PackUpdate { uuid, name, genre, cover_url })
                .context("Update failed")?;
            println!("{}  {} ({} samples)", pack.uuid, pack.name, pack.sample_count);
        }

        Commands::UpdateSample { id, filename, tags, genre, key, chord, bpm, sample_type } => {
            let sample = lib
                .update_sample(&SampleUpdate {
                    id,
                    filename,
                    tags,
                    genre,
                    audio_key: key,
                    chord_type: chord,
                    bpm,
                    sample_type,
                })
                .context("Update failed")?;
            print_sample_table(std::slice::from_ref(&sample));
        }

        Commands::DeleteSample { id } => {
            lib.delete_sample(id).context("Delete failed")?;
            println!("Deleted sample {id}");
        }

        Commands::DeletePack { uuid } => {
            let n = lib.delete_pack(&uuid).context("Delete failed")?;
            println!("Deleted pack {uuid} ({n} samples)");
        }

        Commands::DeleteAll { yes } => {
            if !yes {
                anyhow::bail!("Refusing to delete everything without --yes");
            }
            let n = lib.delete_all_samples().context("Delete failed")?;
            println!("Deleted {n} samples");
        }

        Commands::Export { out, ids } => {
            let pb = progress_bar()?;
            let written = lib
                .export_samples(&ids, &out, &CancelToken::new(), &mut |p| {
                    pb.set_length(p.total as u64);
                    pb.set_position(p.current as u64);
                    pb.set_message(p.current_file.clone());
                })
                .with_context(|| format!("Export to {} failed", out.display()))?;
            pb.finish_and_clear();
            println!("Exported {written} samples to {}", out.display());
        }

        Commands::Playlist { command } => match command {
            PlaylistCommands::List => {
                for p in lib.get_playlists().context("Failed to list playlists")? {
                    println!(
                        "{:>4}  {:<30} {:>5}  {}",
                        p.id,
                        truncate(&p.name, 30),
                        p.sample_count,
                        p.color.as_deref().unwrap_or("")
                    );
                }
            }
            PlaylistCommands::Create { name, color } => {
                let p = lib.create_playlist(&name, color.as_deref()).context("Create failed")?;
                println!("Created playlist {} ({})", p.id, p.name);
            }
            PlaylistCommands::Rename { id, name } => {
                lib.rename_playlist(id, &name).context("Rename failed")?;
            }
            PlaylistCommands::Color { id, color } => {
                lib.update_playlist_color(id, color.as_deref()).context("Update failed")?;
            }
            PlaylistCommands::Delete { id } => {
                lib.delete_playlist(id).context("Delete failed")?;
            }
            PlaylistCommands::Add { id, samples } => {
                lib.add_to_playlist(id, &samples).context("Add failed")?;
            }
            PlaylistCommands::Remove { id, samples } => {
                lib.remove_from_playlist(id, &samples).context("Remove failed")?;
            }
        },
    }

    Ok(())
}
