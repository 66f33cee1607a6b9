//! Command-line parsing
//!
//! `freightmaster [--config <path>] <command> [args]`

use freightmaster_client::{ListResource, LookupResource, ManifestFilters};

use std::path::PathBuf;

use crate::error::{Error, Result};

pub const USAGE: &str = "\
usage: freightmaster [--config <path>] <command>

commands:
  login                      sign in through the browser
  logout                     forget the stored session
  whoami                     show the signed-in identity
  status                     show session and configuration state
  dashboard                  print dashboard data
  get <path>                 GET an API path and print the JSON body
  list <resource> [search]   print a document or reference list
  print-vehicle-log <name> [output]
                             save a vehicle log PDF (default <name>.pdf)

list filters (shipment-manifests only):
  --agent <name>  --vehicle <id>  --destination <name>

list resources:
  goods-receipts shipment-manifests vehicle-logs delivery-notes
  left-goods-logs customers employees delivery-persons destinations
  uoms items vehicles";

/// What `list` fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListTarget {
    Documents(ListResource),
    Reference(LookupResource),
}

impl ListTarget {
    fn parse(name: &str) -> Result<Self> {
        ListResource::from_name(name)
            .map(ListTarget::Documents)
            .or_else(|| LookupResource::from_name(name).map(ListTarget::Reference))
            .ok_or_else(|| Error::UnknownResource(name.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login,
    Logout,
    Whoami,
    Status,
    Dashboard,
    Get { path: String },
    List {
        target: ListTarget,
        search: Option<String>,
        filters: ManifestFilters,
    },
    PrintVehicleLog { name: String, output: PathBuf },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub config_path: Option<String>,
    pub command: Command,
}

impl Cli {
    /// Parse arguments, excluding the program name.
    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config_path = None;
        let mut positional = Vec::new();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => {
                    config_path = Some(args.next().ok_or(Error::MissingArgument("--config <path>"))?);
                }
                "-h" | "--help" => {
                    return Ok(Self {
                        config_path,
                        command: Command::Help,
                    });
                }
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let command = match positional.next().as_deref() {
            None | Some("help") => Command::Help,
            Some("login") => Command::Login,
            Some("logout") => Command::Logout,
            Some("whoami") => Command::Whoami,
            Some("status") => Command::Status,
            Some("dashboard") => Command::Dashboard,
            Some("get") => Command::Get {
                path: positional.next().ok_or(Error::MissingArgument("<path>"))?,
            },
            Some("list") => {
                let name = positional.next().ok_or(Error::MissingArgument("<resource>"))?;
                let target = ListTarget::parse(&name)?;
                let mut filters = ManifestFilters::default();
                let mut terms = Vec::new();
                while let Some(arg) = positional.next() {
                    let (slot, expects) = match arg.as_str() {
                        "--agent" => (&mut filters.agent, "--agent <name>"),
                        "--vehicle" => (&mut filters.vehicle, "--vehicle <id>"),
                        "--destination" => (&mut filters.destination, "--destination <name>"),
                        _ => {
                            terms.push(arg);
                            continue;
                        }
                    };
                    *slot = Some(positional.next().ok_or(Error::MissingArgument(expects))?);
                }
                if !filters.is_empty() && target != ListTarget::Documents(ListResource::ShipmentManifests) {
                    return Err(Error::FiltersNotSupported(name));
                }
                Command::List {
                    target,
                    search: (!terms.is_empty()).then(|| terms.join(" ")),
                    filters,
                }
            }
            Some("print-vehicle-log") => {
                let name = positional.next().ok_or(Error::MissingArgument("<name>"))?;
                let output = positional
                    .next()
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from(format!("{}.pdf", name.replace('/', "-"))));
                Command::PrintVehicleLog { name, output }
            }
            Some(other) => return Err(Error::UnknownCommand(other.to_string())),
        };

        Ok(Self {
            config_path,
            command,
        })
    }
}
