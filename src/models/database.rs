use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Database engines with a macro dialect
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// Microsoft SQL Server
    MsSql,
    /// PostgreSQL database
    PostgreSQL,
    /// MySQL / MariaDB database
    MySQL,
}

impl DatabaseType {
    /// Get the string representation of the database type
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::MsSql => "mssql",
            DatabaseType::PostgreSQL => "postgresql",
            DatabaseType::MySQL => "mysql",
        }
    }
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mssql" | "sqlserver" => Ok(DatabaseType::MsSql),
            "postgresql" | "postgres" => Ok(DatabaseType::PostgreSQL),
            "mysql" | "mariadb" => Ok(DatabaseType::MySQL),
            _ => Err(format!("Unsupported database type: {}", s)),
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_type_parsing() {
        assert_eq!("Postgres".parse::<DatabaseType>().unwrap(), DatabaseType::PostgreSQL);
        assert_eq!("sqlserver".parse::<DatabaseType>().unwrap(), DatabaseType::MsSql);
        assert_eq!("mariadb".parse::<DatabaseType>().unwrap(), DatabaseType::MySQL);
        assert!("oracle".parse::<DatabaseType>().is_err());
    }

    #[test]
    fn test_database_type_round_trip_name() {
        for db in [DatabaseType::MsSql, DatabaseType::PostgreSQL, DatabaseType::MySQL] {
            assert_eq!(db.as_str().parse::<DatabaseType>().unwrap(), db);
        }
    }
}
