//! Connection descriptors: `<endpoint>?ns=<namespace>&db=<database>`.

use std::fmt;
use std::str::FromStr;

use crate::error::DbError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
}

impl ConnectionDescriptor {
    /// Database name for a tenant slug. Slugs only contain `[a-z0-9-]`, so
    /// the result is a plain SurrealQL identifier.
    pub fn database_for_slug(slug: &str) -> String {
        format!("tenant_{}", slug.replace('-', "_"))
    }
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}?ns={}&db={}",
            self.endpoint, self.namespace, self.database
        )
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (endpoint, query) = s
            .rsplit_once('?')
            .ok_or_else(|| DbError::Descriptor(format!("missing query in '{s}'")))?;

        let mut namespace = None;
        let mut database = None;
        for pair in query.split('&') {
            match pair.split_once('=') {
                Some(("ns", v)) if !v.is_empty() => namespace = Some(v.to_string()),
                Some(("db", v)) if !v.is_empty() => database = Some(v.to_string()),
                _ => return Err(DbError::Descriptor(format!("unexpected parameter '{pair}'"))),
            }
        }

        match (namespace, database) {
            (Some(namespace), Some(database)) if !endpoint.is_empty() => Ok(Self {
                endpoint: endpoint.to_string(),
                namespace,
                database,
            }),
            _ => Err(DbError::Descriptor(format!(
                "descriptor '{s}' needs an endpoint, ns and db"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_what_it_prints() {
        let descriptor = ConnectionDescriptor {
            endpoint: "ws://db.internal:8000".into(),
            namespace: "tenants".into(),
            database: ConnectionDescriptor::database_for_slug("acme-inc"),
        };
        let text = descriptor.to_string();
        assert_eq!(text, "ws://db.internal:8000?ns=tenants&db=tenant_acme_inc");
        assert_eq!(text.parse::<ConnectionDescriptor>().unwrap(), descriptor);
    }

    #[test]
    fn rejects_incomplete_descriptors() {
        assert!("mem://".parse::<ConnectionDescriptor>().is_err());
        assert!("mem://?ns=tenants".parse::<ConnectionDescriptor>().is_err());
        assert!("mem://?ns=a&db=b&x=1".parse::<ConnectionDescriptor>().is_err());
    }
}
