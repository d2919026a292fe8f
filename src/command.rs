//! Typed control-plane commands and replies.
//!
//! These mirror the attributes a control-plane message carries for the
//! bitmap:port type. Parsing and encoding the wire form belongs to the
//! protocol layer; it hands this module already-decoded values.

use serde::{Deserialize, Serialize};

use crate::set::{AddExt, BitmapPortSet, CreateOptions, Entry, SetConfig, SetError, SetHeader};

/// Create a set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateCmd {
    pub first_port: u16,
    pub last_port: u16,
    #[serde(default)]
    pub timeout: Option<u32>,
    #[serde(default)]
    pub with_counters: bool,
}

impl CreateCmd {
    pub fn config(&self) -> SetConfig {
        SetConfig::new(
            self.first_port,
            self.last_port,
            self.timeout,
            self.with_counters,
        )
    }
}

/// Add / Delete / Test / List / Head / Flush on an existing set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AdtCmd {
    Add {
        port: u16,
        #[serde(default)]
        port_to: Option<u16>,
        #[serde(default)]
        timeout: Option<u32>,
        #[serde(default)]
        packets: Option<u64>,
        #[serde(default)]
        bytes: Option<u64>,
        #[serde(default)]
        exists_ok: bool,
    },
    Del {
        port: u16,
        #[serde(default)]
        port_to: Option<u16>,
        #[serde(default)]
        exists_ok: bool,
    },
    /// Test a single port; a `port_to` other than `port` is rejected.
    Test {
        port: u16,
        #[serde(default)]
        port_to: Option<u16>,
    },
    List,
    Head,
    Flush,
}

/// Result of a List command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListReply {
    pub header: SetHeader,
    pub entries: Vec<Entry>,
}

/// Successful command outcome.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Reply {
    Ok,
    Tested { present: bool },
    Listed(ListReply),
    Header(SetHeader),
}

impl BitmapPortSet {
    /// Create a set from a decoded Create command.
    pub fn from_create(cmd: &CreateCmd, options: CreateOptions) -> Result<Self, SetError> {
        Self::create(cmd.config(), options)
    }

    /// Execute one decoded command.
    pub fn execute(&self, cmd: &AdtCmd) -> Result<Reply, SetError> {
        match *cmd {
            AdtCmd::Add {
                port,
                port_to,
                timeout,
                packets,
                bytes,
                exists_ok,
            } => {
                let ext = AddExt {
                    timeout,
                    packets,
                    bytes,
                };
                match port_to {
                    Some(port_to) => self.add_range(port, port_to, &ext, exists_ok)?,
                    None => self.add(port, &ext, exists_ok)?,
                }
                Ok(Reply::Ok)
            }
            AdtCmd::Del {
                port,
                port_to,
                exists_ok,
            } => {
                match port_to {
                    Some(port_to) => self.del_range(port, port_to, exists_ok)?,
                    None => match self.del(port) {
                        Err(err) if exists_ok && err.is_exists() => {}
                        other => other?,
                    },
                }
                Ok(Reply::Ok)
            }
            AdtCmd::Test { port, port_to } => {
                if port_to.is_some_and(|to| to != port) {
                    return Err(SetError::Protocol {
                        detail: "test does not take a port range",
                    });
                }
                Ok(Reply::Tested {
                    present: self.test(port)?,
                })
            }
            AdtCmd::List => Ok(Reply::Listed(ListReply {
                header: self.head(),
                entries: self.list(),
            })),
            AdtCmd::Head => Ok(Reply::Header(self.head())),
            AdtCmd::Flush => {
                self.flush();
                Ok(Reply::Ok)
            }
        }
    }
}
