//! OS power-management interface used to trigger hibernation

use crate::error::{Error, Result};
use crate::host::{PrivilegedRequest, SystemHost};
use std::sync::Arc;
use tracing::{debug, info};

const LOGIN1_SERVICE: &str = "org.freedesktop.login1";
const LOGIN1_PATH: &str = "/org/freedesktop/login1";
const LOGIN1_MANAGER: &str = "org.freedesktop.login1.Manager";

/// Answer of logind's `CanHibernate`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HibernateCapability {
    /// Allowed without authentication
    Yes,
    /// Allowed after authentication
    Challenge,
    /// Forbidden by policy
    No,
    /// Not supported by hardware, kernel or swap setup
    NotAvailable,
}

impl HibernateCapability {
    pub fn parse(answer: &str) -> Result<Self> {
        match answer.trim() {
            "yes" => Ok(Self::Yes),
            "challenge" => Ok(Self::Challenge),
            "no" => Ok(Self::No),
            "na" => Ok(Self::NotAvailable),
            other => Err(Error::Parse(format!("Unexpected CanHibernate answer: {}", other))),
        }
    }

    pub fn is_possible(&self) -> bool {
        matches!(self, Self::Yes | Self::Challenge)
    }
}

pub trait PowerManager: Send + Sync {
    fn can_hibernate(&self) -> Result<HibernateCapability>;

    /// Ask the OS to hibernate. Returns once the request is accepted; the
    /// process is frozen shortly after.
    fn hibernate(&self) -> Result<()>;
}

/// systemd-logind over the system bus
pub struct LogindPowerManager;

impl LogindPowerManager {
    pub fn new() -> Self {
        Self
    }

    fn call<B>(&self, method: &str, body: &B) -> Result<zbus::Message>
    where
        B: serde::Serialize + zbus::zvariant::DynamicType,
    {
        let connection = zbus::blocking::Connection::system()?;
        connection
            .call_method(
                Some(LOGIN1_SERVICE),
                LOGIN1_PATH,
                Some(LOGIN1_MANAGER),
                method,
                body,
            )
            .map_err(map_dbus_error)
    }
}

impl Default for LogindPowerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PowerManager for LogindPowerManager {
    fn can_hibernate(&self) -> Result<HibernateCapability> {
        let reply = self.call("CanHibernate", &())?;
        let answer: String = reply.body().deserialize()?;
        debug!("logind CanHibernate: {}", answer);
        HibernateCapability::parse(&answer)
    }

    fn hibernate(&self) -> Result<()> {
        info!("Requesting hibernation from logind");
        // interactive=true lets polkit prompt for authentication
        self.call("Hibernate", &(true,))?;
        Ok(())
    }
}

/// Policy and authorization refusals from logind are permission problems
fn map_dbus_error(err: zbus::Error) -> Error {
    if let zbus::Error::MethodError(name, detail, _) = &err {
        let name = name.as_str();
        if name == "org.freedesktop.DBus.Error.AccessDenied"
            || name.starts_with("org.freedesktop.PolicyKit1.Error")
            || name == "org.freedesktop.DBus.Error.InteractiveAuthorizationRequired"
        {
            return Error::PermissionDenied(format!(
                "logind refused to hibernate: {}",
                detail.clone().unwrap_or_else(|| name.to_string())
            ));
        }
    }
    Error::Dbus(err)
}

/// `systemctl hibernate` through the privileged boundary
pub struct SystemctlPowerManager {
    host: Arc<dyn SystemHost>,
}

impl SystemctlPowerManager {
    pub fn new(host: Arc<dyn SystemHost>) -> Self {
        Self { host }
    }
}

impl PowerManager for SystemctlPowerManager {
    fn can_hibernate(&self) -> Result<HibernateCapability> {
        let output = self.host.run(&["systemctl", "hibernate", "--dry-run"])?;
        Ok(if output.success() {
            HibernateCapability::Yes
        } else {
            HibernateCapability::NotAvailable
        })
    }

    fn hibernate(&self) -> Result<()> {
        info!("Requesting hibernation through systemctl");
        let request = PrivilegedRequest::new("hibernate the system", ["systemctl", "hibernate"]);
        self.host
            .run_privileged(&request)?
            .check("systemctl hibernate")?;
        Ok(())
    }
}
