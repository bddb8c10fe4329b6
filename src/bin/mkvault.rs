use std::path::PathBuf;

use log::debug;
use pretty_env_logger;
use structopt::StructOpt;

use vaultfs::consensus::BlockStore;
use vaultfs::fs::Filesystem;
use vaultfs::registry::{self, Layout, NetworkDescriptor, SiloConfig, SiloKind, UserIdentity, VolumeConfig};
use vaultfs::silo::file::FileSilo;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "mkvault",
    about = "format a new network and volume under a data root, owned by a (possibly fresh) user identity"
)]
struct Opt {
    /// Data root a user's registry and block storage live under
    #[structopt(parse(from_os_str))]
    data_root: PathBuf,
    /// Network name
    #[structopt(short = "n", long = "network")]
    network: String,
    /// Volume name
    #[structopt(short = "o", long = "volume")]
    volume: String,
    /// Owning user's name; created fresh if no such user is registered yet
    #[structopt(short = "u", long = "user")]
    user: String,
    /// Owning user's password
    #[structopt(short = "p", long = "password")]
    password: Option<String>,
    /// Root directory mode
    #[structopt(short = "m", long = "mode", default_value = "493")] // 0o755
    mode: u32,
}

fn main() -> Result<(), failure::Error> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    debug!("running with options {:?}", opt);

    let password = if let Some(password) = opt.password.clone() {
        password
    } else {
        rpassword::read_password_from_tty(Some("owner password: ")).unwrap()
    };

    let layout = Layout::new(opt.data_root.clone());
    let user_path = layout.user(&opt.user);
    let identity = if user_path.exists() {
        let stored: UserIdentity = registry::load_json(&user_path)?;
        stored
    } else {
        let fresh = UserIdentity::create(opt.user.clone(), &password)?;
        registry::save_json_private(&user_path, &fresh)?;
        fresh
    };
    let (signing, agreement) = identity.unlock(&password)?;

    let blocks_dir = layout.blocks_dir(&opt.network);
    let silo = FileSilo::new(&blocks_dir)?;
    let consensus = BlockStore::new(silo);

    let root = Filesystem::create_root(&consensus, &signing, &agreement, opt.mode)?;

    let mut descriptor = NetworkDescriptor::new(signing.public_key(), opt.network.clone(), opt.network.clone());
    descriptor.admins.grant(signing.public_key(), true);
    let owner_hex = descriptor.owner_hex();
    registry::save_json(&layout.network(&owner_hex, &opt.network), &descriptor)?;

    let silo_config = SiloConfig::new(
        opt.network.clone(),
        SiloKind::File {
            path: blocks_dir.to_string_lossy().into_owned(),
        },
    );
    registry::save_json(&layout.silo(&opt.network), &silo_config)?;

    let volume = VolumeConfig::new(opt.volume.clone(), opt.network.clone(), root);
    registry::save_json(&layout.volume(&opt.volume), &volume)?;

    println!(
        "Created network '{}' and volume '{}' at {:?}, root block {:?}.",
        opt.network, opt.volume, opt.data_root, root
    );
    Ok(())
}
