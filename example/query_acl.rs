extern crate clap;
extern crate env_logger;
extern crate file_acl;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use file_acl::rights;
use file_acl::{AccountLookup, FileSecurity, Options, PermissionMap, SecurityStore};
use std::process::exit;

fn parse_grants<'a, I: Iterator<Item = &'a str>>(grants: I) -> Result<PermissionMap, String> {
    let mut perms = PermissionMap::new();
    for grant in grants {
        let split = grant
            .rfind('=')
            .ok_or_else(|| format!("expected ACCOUNT=RIGHTS, got `{}`", grant))?;
        let (account, expr) = (&grant[..split], &grant[split + 1..]);
        let mask = rights::parse(expr).map_err(|e| e.to_string())?;
        perms.insert(account.to_string(), mask);
    }

    Ok(perms)
}

#[cfg_attr(not(windows), allow(dead_code))]
fn run<A: AccountLookup, S: SecurityStore>(files: &FileSecurity<A, S>, command: &str, args: &ArgMatches) -> Result<(), String> {
    let path = args.value_of("path").unwrap_or_default();

    match command {
        "get" => {
            let perms = files.get_permissions(path, args.value_of("host")).map_err(|e| e.to_string())?;
            println!("Permissions for {}", path);
            for (account, mask) in &perms {
                println!("  {} = 0x{:08x} ({})", account, mask, files.securities(*mask).join(", "));
            }
        }
        "set" => {
            let perms = parse_grants(args.values_of("grant").into_iter().flatten())?;
            files.set_permissions(path, &perms).map_err(|e| e.to_string())?;
            println!("Wrote {} account(s) to {}", perms.len(), path);
        }
        "entries" => {
            let entries = files.entries(path).map_err(|e| e.to_string())?;
            println!("Access control entries for {}", path);
            println!("Directory: {}", files.is_directory(path));
            for (i, entry) in entries.iter().enumerate() {
                println!("  AccessControlEntry[{}] {{", i);
                for line in entry.to_string().lines() {
                    println!("    {}", line.trim_start());
                }
                println!("  }}");
            }
        }
        "owner" => {
            println!("{}", files.owner(path).map_err(|e| e.to_string())?);
        }
        _ => return Err(format!("unknown command `{}`", command)),
    }

    Ok(())
}

#[cfg(windows)]
fn run_native(options: Options, command: &str, args: &ArgMatches) -> Result<(), String> {
    run(&FileSecurity::native().with_options(options), command, args)
}

#[cfg(not(windows))]
fn run_native(_options: Options, _command: &str, _args: &ArgMatches) -> Result<(), String> {
    Err("no native security backend is available on this platform".to_string())
}

pub fn main() {
    env_logger::init();

    let path_arg = Arg::with_name("path").help("File or directory path").required(true).index(1);

    let matches = App::new("Query ACL")
        .about("Grants and inspects file permissions")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(Arg::with_name("acl-capacity")
            .long("acl-capacity")
            .help("Bytes allocated for a new DACL")
            .takes_value(true)
            .global(true))
        .subcommand(SubCommand::with_name("get")
            .about("Prints the account to rights map of a file")
            .arg(path_arg.clone())
            .arg(Arg::with_name("host")
                .long("host")
                .help("System to resolve account names on")
                .takes_value(true)))
        .subcommand(SubCommand::with_name("set")
            .about("Replaces a file's DACL, e.g. `set report.txt BUILTIN\\Users=READ`")
            .arg(path_arg.clone())
            .arg(Arg::with_name("grant")
                .help("ACCOUNT=RIGHTS, where RIGHTS is a `|`-separated list of names or hex masks")
                .multiple(true)
                .required(true)
                .index(2)))
        .subcommand(SubCommand::with_name("entries")
            .about("Lists every DACL entry of a file")
            .arg(path_arg.clone()))
        .subcommand(SubCommand::with_name("owner")
            .about("Prints the owner of a file")
            .arg(path_arg))
        .subcommand(SubCommand::with_name("labels")
            .about("Names the rights in a mask")
            .arg(Arg::with_name("mask")
                .help("Rights expression, e.g. 0x1200a9 or READ|DELETE")
                .required(true)
                .index(1)))
        .get_matches();

    let mut options = Options::default();
    if let Some(capacity) = matches.value_of("acl-capacity") {
        match capacity.parse::<usize>() {
            Ok(capacity) => options = options.with_acl_capacity(capacity),
            Err(_) => {
                eprintln!("--acl-capacity expects a byte count, got `{}`", capacity);
                exit(2);
            }
        }
    }

    let result = match matches.subcommand() {
        ("labels", Some(args)) => rights::parse(args.value_of("mask").unwrap_or_default())
            .map(|mask| println!("{}", rights::labels(mask).join(", ")))
            .map_err(|e| e.to_string()),
        (command, Some(args)) => run_native(options, command, args),
        _ => Err("no command given".to_string()),
    };

    if let Err(message) = result {
        eprintln!("{}", message);
        exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use file_acl::{AccountTable, MemoryStore, SecurityDescriptor};

    #[test]
    fn grants_parse_into_a_permission_map() {
        let perms = parse_grants(vec!["BUILTIN\\Users=READ", "Everyone=0x1f01ff"].into_iter()).unwrap();
        assert_eq!(perms["BUILTIN\\Users"], rights::READ);
        assert_eq!(perms["Everyone"], rights::FULL);

        assert!(parse_grants(vec!["Everyone"].into_iter()).is_err());
        assert!(parse_grants(vec!["Everyone=WRITE"].into_iter()).is_err());
    }

    #[test]
    fn commands_run_against_any_backend() {
        let store = MemoryStore::new();
        store.create_file("notes.txt", &SecurityDescriptor::new()).unwrap();
        let files = FileSecurity::new(AccountTable::new(), store);

        let app = App::new("t").subcommand(
            SubCommand::with_name("set")
                .arg(Arg::with_name("path").index(1))
                .arg(Arg::with_name("grant").multiple(true).index(2)),
        );
        let matches = app.get_matches_from(vec!["t", "set", "notes.txt", "Everyone=READ"]);
        let (command, args) = matches.subcommand();
        run(&files, command, args.unwrap()).unwrap();

        assert_eq!(files.get_permissions("notes.txt", None).unwrap()["Everyone"], rights::READ);
    }
}
