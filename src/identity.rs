//! Account name ↔ SID resolution.
//!
//! The resolver talks to an [`AccountLookup`] service so that the same code
//! drives the native Windows lookup and the portable [`AccountTable`].

use crate::error::{codes, Error, Result};
use crate::sid::Sid;
use log::debug;
use std::fmt;
use std::str::FromStr;

/// Domains that name the local machine's built-in principals. Lookups for
/// them go to the local system instead of a host of that name.
const LOCAL_DOMAINS: [&str; 2] = ["BUILTIN", "NT AUTHORITY"];

/// An account as reported by a SID lookup.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct AccountName {
    pub domain: String,
    pub name: String,
}

impl AccountName {
    pub fn new<D: Into<String>, N: Into<String>>(domain: D, name: N) -> Self {
        AccountName {
            domain: domain.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for AccountName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.domain.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}\\{}", self.domain, self.name)
        }
    }
}

impl FromStr for AccountName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.splitn(2, '\\');
        let first = parts.next().unwrap_or_default();
        let account = match parts.next() {
            Some(name) => AccountName::new(first, name),
            None => AccountName::new("", first),
        };

        if account.name.is_empty() || account.name.contains('\\') {
            return Err(Error::encoding(format!("`{}` is not an account name", s)));
        }

        Ok(account)
    }
}

/// The identity service consulted on both the write and the read path.
///
/// Errors are platform error codes, e.g. `ERROR_NONE_MAPPED` when the
/// account does not exist.
pub trait AccountLookup {
    fn lookup_account_name(&self, system: Option<&str>, account: &str) -> std::result::Result<Sid, u32>;

    fn lookup_account_sid(&self, system: Option<&str>, sid: &Sid) -> std::result::Result<AccountName, u32>;
}

impl<'a, T: AccountLookup + ?Sized> AccountLookup for &'a T {
    fn lookup_account_name(&self, system: Option<&str>, account: &str) -> std::result::Result<Sid, u32> {
        (**self).lookup_account_name(system, account)
    }

    fn lookup_account_sid(&self, system: Option<&str>, sid: &Sid) -> std::result::Result<AccountName, u32> {
        (**self).lookup_account_sid(system, sid)
    }
}

/// Resolves `DOMAIN\name` (or a bare name) to its SID.
///
/// A `BUILTIN` or `NT AUTHORITY` prefix is dropped so the lookup runs
/// against the local system; any other prefix names the system to ask.
pub fn resolve<A: AccountLookup + ?Sized>(accounts: &A, qualified_name: &str) -> Result<Sid> {
    let (system, account) = match qualified_name.find('\\') {
        Some(split) => {
            let (domain, rest) = qualified_name.split_at(split);
            let system = if LOCAL_DOMAINS.iter().any(|d| d.eq_ignore_ascii_case(domain)) {
                None
            } else {
                Some(domain)
            };
            (system, &rest[1..])
        }
        None => (None, qualified_name),
    };

    match accounts.lookup_account_name(system, account) {
        Ok(sid) => {
            debug!("resolved {} to {}", qualified_name, sid);
            Ok(sid)
        }
        Err(codes::ERROR_NONE_MAPPED) => Err(Error::IdentityNotFound {
            account: qualified_name.to_owned(),
        }),
        Err(code) => Err(Error::system("LookupAccountNameW", code)),
    }
}

/// Resolves a SID to `DOMAIN\name`, or the bare name when the domain is empty.
pub fn resolve_name<A: AccountLookup + ?Sized>(accounts: &A, sid: &Sid, host: Option<&str>) -> Result<String> {
    accounts
        .lookup_account_sid(host, sid)
        .map(|account| account.to_string())
        .map_err(|code| Error::system("LookupAccountSidW", code))
}

struct AccountRecord {
    account: AccountName,
    sid: Sid,
}

/// An in-process account database.
///
/// Names compare case-insensitively, as they do on Windows. The table starts
/// with the well-known principals; local accounts are added with
/// [`AccountTable::insert`].
pub struct AccountTable {
    records: Vec<AccountRecord>,
}

impl AccountTable {
    pub fn new() -> AccountTable {
        let well_known: [(&str, &str, u8, &[u32]); 7] = [
            ("", "Everyone", 1, &[0]),
            ("", "CREATOR OWNER", 3, &[0]),
            ("NT AUTHORITY", "Authenticated Users", 5, &[11]),
            ("NT AUTHORITY", "SYSTEM", 5, &[18]),
            ("BUILTIN", "Administrators", 5, &[32, 544]),
            ("BUILTIN", "Users", 5, &[32, 545]),
            ("BUILTIN", "Guests", 5, &[32, 546]),
        ];

        let mut table = AccountTable { records: Vec::new() };
        for &(domain, name, authority, subs) in well_known.iter() {
            if let Ok(sid) = Sid::from_parts(authority, subs) {
                table.insert(domain, name, sid);
            }
        }

        table
    }

    /// Adds an account, replacing any existing account with the same name.
    pub fn insert<D: Into<String>, N: Into<String>>(&mut self, domain: D, name: N, sid: Sid) -> &mut Self {
        let account = AccountName::new(domain, name);
        self.records.retain(|r| {
            !(r.account.domain.eq_ignore_ascii_case(&account.domain)
                && r.account.name.eq_ignore_ascii_case(&account.name))
        });
        self.records.push(AccountRecord { account, sid });
        self
    }

    fn is_well_known(domain: &str) -> bool {
        domain.is_empty() || LOCAL_DOMAINS.iter().any(|d| d.eq_ignore_ascii_case(domain))
    }
}

impl Default for AccountTable {
    fn default() -> Self {
        AccountTable::new()
    }
}

impl AccountLookup for AccountTable {
    fn lookup_account_name(&self, system: Option<&str>, account: &str) -> std::result::Result<Sid, u32> {
        let wanted: AccountName = account.parse().map_err(|_| codes::ERROR_INVALID_PARAMETER)?;

        self.records
            .iter()
            .filter(|r| r.account.name.eq_ignore_ascii_case(&wanted.name))
            .find(|r| {
                let domain = &r.account.domain;
                let domain_ok = wanted.domain.is_empty() || domain.eq_ignore_ascii_case(&wanted.domain);
                let system_ok = match system {
                    Some(host) => domain.eq_ignore_ascii_case(host) || AccountTable::is_well_known(domain),
                    None => true,
                };
                domain_ok && system_ok
            })
            .map(|r| r.sid.clone())
            .ok_or(codes::ERROR_NONE_MAPPED)
    }

    fn lookup_account_sid(&self, _system: Option<&str>, sid: &Sid) -> std::result::Result<AccountName, u32> {
        self.records
            .iter()
            .find(|r| &r.sid == sid)
            .map(|r| r.account.clone())
            .ok_or(codes::ERROR_NONE_MAPPED)
    }
}
