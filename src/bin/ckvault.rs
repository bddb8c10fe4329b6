use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use pretty_env_logger;
use structopt::StructOpt;

use vaultfs::consensus::{BlockStore, Consensus};
use vaultfs::registry::Layout;
use vaultfs::silo::file::FileSilo;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "ckvault",
    about = "scan a silo's on-disk blocks for corruption and validation failures",
    global_settings(&[structopt::clap::AppSettings::ColoredHelp])
)]
struct Opt {
    /// Data root the silo lives under
    #[structopt(parse(from_os_str))]
    data_root: PathBuf,
    /// Silo (network) name to scan
    #[structopt(short = "n", long = "network")]
    network: String,
    /// Print every block visited, not just failures
    #[structopt(short = "v", long = "verbose")]
    verbose: bool,
}

fn collect_block_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_block_files(&path, out)?;
        } else if path.extension().map(|e| e == "block").unwrap_or(false) {
            out.push(path);
        }
    }
    Ok(())
}

fn main() -> Result<(), failure::Error> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    debug!("running with options {:?}", opt);

    let layout = Layout::new(opt.data_root.clone());
    let blocks_dir = layout.blocks_dir(&opt.network);
    let silo = FileSilo::new(&blocks_dir)?;
    let store = BlockStore::new(silo);

    let mut files = Vec::new();
    collect_block_files(&blocks_dir, &mut files)?;

    let mut scanned = 0u64;
    let mut corrupt = 0u64;
    let mut invalid = 0u64;

    for path in &files {
        scanned += 1;
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                println!("unreadable: {:?}: {}", path, e);
                corrupt += 1;
                continue;
            }
        };

        let block = match vaultfs::block::Block::from_bytes(&bytes) {
            Ok(block) => block,
            Err(e) => {
                println!("corrupt: {:?}: {}", path, e);
                corrupt += 1;
                continue;
            }
        };

        match store.fetch(block.address()) {
            Ok(_) => {
                if opt.verbose {
                    println!("ok: {:?}", block.address());
                }
            }
            Err(e) => {
                println!("invalid: {:?}: {}", block.address(), e);
                invalid += 1;
            }
        }
    }

    println!(
        "scanned {} blocks under {:?}: {} corrupt, {} failed validation, {} ok.",
        scanned,
        blocks_dir,
        corrupt,
        invalid,
        scanned - corrupt - invalid
    );

    if corrupt > 0 || invalid > 0 {
        std::process::exit(1);
    }
    Ok(())
}
