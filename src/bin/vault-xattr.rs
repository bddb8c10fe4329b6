use std::path::PathBuf;
use std::sync::Arc;

use log::debug;
use pretty_env_logger;
use structopt::StructOpt;

use vaultfs::consensus::BlockStore;
use vaultfs::fs::Filesystem;
use vaultfs::registry::{self, Layout, NetworkDescriptor, VolumeConfig};
use vaultfs::silo::file::FileSilo;

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Print one attribute's value
    Get { path: String, name: String },
    /// Set one attribute's value
    Set { path: String, name: String, value: String },
    /// List the attribute names set on a path
    List { path: String },
    /// Remove one attribute
    Remove { path: String, name: String },
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "vault-xattr",
    about = "inspect and edit extended attributes on a mounted volume, without a live mount"
)]
struct Opt {
    /// Data root the volume's network and user registry live under
    #[structopt(parse(from_os_str))]
    data_root: PathBuf,
    /// Volume name, as registered by mkvault
    #[structopt(short = "o", long = "volume")]
    volume: String,
    /// Network name the volume belongs to
    #[structopt(short = "n", long = "network")]
    network: String,
    /// Acting user's name
    #[structopt(short = "u", long = "user")]
    user: String,
    /// Acting user's password
    #[structopt(short = "p", long = "password")]
    password: Option<String>,
    #[structopt(subcommand)]
    command: Command,
}

fn main() -> Result<(), failure::Error> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    debug!("running with options {:?}", opt);

    let password = if let Some(password) = opt.password.clone() {
        password
    } else {
        rpassword::read_password_from_tty(Some("password: ")).unwrap()
    };

    let layout = Layout::new(opt.data_root.clone());
    let identity: vaultfs::registry::UserIdentity = registry::load_json(&layout.user(&opt.user))?;
    let (signing, agreement) = identity.unlock(&password)?;

    let volume: VolumeConfig = registry::load_json(&layout.volume(&opt.volume))?;
    let silo = FileSilo::new(layout.blocks_dir(&opt.network))?;
    let consensus = Arc::new(BlockStore::new(silo));

    let owner_hex = hex_encode(&signing.public_key());
    let network: NetworkDescriptor = registry::load_json(&layout.network(&owner_hex, &opt.network))?;

    let filesystem = Filesystem::new(
        consensus,
        signing,
        agreement,
        network.admins,
        volume.root,
        volume.block_size as u32,
        volume.max_embed_size as usize,
        2,
    );

    match opt.command {
        Command::Get { path, name } => {
            let value = filesystem.getxattr(&path, &name)?;
            match std::str::from_utf8(&value) {
                Ok(s) => println!("{}", s),
                Err(_) => println!("{:?}", value),
            }
        }
        Command::Set { path, name, value } => {
            filesystem.setxattr(&path, &name, value.as_bytes())?;
            println!("set {} on {}", name, path);
        }
        Command::List { path } => {
            for name in filesystem.listxattr(&path)? {
                println!("{}", name);
            }
        }
        Command::Remove { path, name } => {
            filesystem.removexattr(&path, &name)?;
            println!("removed {} from {}", name, path);
        }
    }

    Ok(())
}
