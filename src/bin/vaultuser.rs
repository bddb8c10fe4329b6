use std::io::{self, Write};
use std::path::PathBuf;

use log::debug;
use pretty_env_logger;
use structopt::StructOpt;

use vaultfs::registry::{self, Layout, UserIdentity};

#[derive(Debug, StructOpt)]
#[structopt(
    name = "vaultuser",
    about = "create or list local user identities under a data root",
    global_settings(&[structopt::clap::AppSettings::ColoredHelp])
)]
struct Opt {
    /// Data root the user registry lives under
    #[structopt(parse(from_os_str))]
    data_root: PathBuf,
    /// List existing users instead of creating one
    #[structopt(short = "l", long = "list")]
    list: bool,
    /// User name to create
    #[structopt(short = "u", long = "user")]
    user: Option<String>,
    /// New user's password
    #[structopt(short = "p", long = "password")]
    password: Option<String>,
}

fn main() -> Result<(), failure::Error> {
    pretty_env_logger::init();

    let opt = Opt::from_args();
    debug!("running with options {:?}", opt);

    let layout = Layout::new(opt.data_root.clone());

    if opt.list {
        let users_dir = layout.root().join("users");
        match std::fs::read_dir(&users_dir) {
            Ok(entries) => {
                for entry in entries {
                    let entry = entry?;
                    if let Some(name) = entry.file_name().to_str() {
                        println!(" - '{}'", name);
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        return Ok(());
    }

    let name = if let Some(name) = opt.user {
        name
    } else {
        io::stdout().write_all(b"user: ")?;
        io::stdout().flush()?;
        let mut name = String::new();
        io::stdin().read_line(&mut name)?;
        name.trim().to_string()
    };

    let password = if let Some(password) = opt.password {
        password
    } else {
        let password = rpassword::read_password_from_tty(Some("password: ")).unwrap();
        let confirm = rpassword::read_password_from_tty(Some("confirm password: ")).unwrap();
        if password != confirm {
            return Err(vaultfs::Error::InvalidArgument("passwords do not match".into()).into());
        }
        password
    };

    let identity = UserIdentity::create(name.clone(), &password)?;
    registry::save_json_private(&layout.user(&name), &identity)?;
    println!("Created user '{}'.", name);

    Ok(())
}
