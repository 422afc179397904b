//! Single-file migration format
//!
//! All migrations live in one SQL script that is embedded into the binary.
//! Each migration starts with a header line comment:
//! ```text
//! --##1 initial schema
//! ```
//! The header holds the version (1) and a description (initial schema).
//! Versions have to increase from one migration to the next. Comment lines
//! before the first header are ignored.
use std::{borrow::Cow, future::Future, pin::Pin};

use sqlx::{
    error::BoxDynError,
    migrate::{Migration, MigrationSource, MigrationType},
};

const HEADER_PREFIX: &str = "--##";

#[derive(Debug)]
pub struct MigrationScript<'s> {
    data: &'s str,
}

impl<'s> MigrationScript<'s> {
    pub fn new(data: &'s str) -> Self {
        Self { data }
    }

    fn parse(&self) -> Result<Vec<Migration>, String> {
        // version, description, sql
        let mut sections: Vec<(i64, String, String)> = Vec::new();

        for line in self.data.lines() {
            if line.trim().is_empty() {
                continue;
            }

            if let Some(header) = line.strip_prefix(HEADER_PREFIX) {
                let (version, description) = header.split_once(' ').unwrap_or((header, ""));
                let version: i64 = version.parse().map_err(|e| {
                    format!("cannot parse migration version '{}': {}", version, e)
                })?;

                if let Some((previous, _, _)) = sections.last() {
                    if *previous >= version {
                        return Err(format!(
                            "migration version {} does not increase over {}",
                            version, previous
                        ));
                    }
                }

                sections.push((version, description.trim().to_owned(), String::new()));
                continue;
            }

            match sections.last_mut() {
                Some((_, _, sql)) => {
                    sql.push_str(line);
                    sql.push('\n');
                }
                None if line.starts_with("--") => continue,
                None => {
                    return Err(format!(
                        "migration script does not start with a migration header, got: {}",
                        line
                    ))
                }
            }
        }

        // the checksum is taken in `Migration::new`, so the sql has to be complete here
        Ok(sections
            .into_iter()
            .map(|(version, description, sql)| {
                Migration::new(
                    version,
                    Cow::Owned(description),
                    MigrationType::Simple,
                    Cow::Owned(sql),
                )
            })
            .collect())
    }
}

impl<'s> MigrationSource<'s> for MigrationScript<'s> {
    fn resolve(
        self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Migration>, BoxDynError>> + Send + 's>> {
        Box::pin(async move { Ok(self.parse()?) })
    }
}

pub fn postgresql_migrations() -> MigrationScript<'static> {
    MigrationScript::new(include_str!("./sql/migrations.pg.sql"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_script_at_headers() {
        let script = MigrationScript::new(
            "-- leading comment\n\n--##1 first\nCREATE TABLE a (id INT);\n\n--##2 second step\nCREATE TABLE b (id INT);\nCREATE TABLE c (id INT);\n",
        );
        let migrations = script.parse().unwrap();

        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].version, 1);
        assert_eq!(migrations[0].description, "first");
        assert_eq!(migrations[0].sql, "CREATE TABLE a (id INT);\n");
        assert_eq!(migrations[1].version, 2);
        assert_eq!(migrations[1].description, "second step");
        assert_eq!(
            migrations[1].sql,
            "CREATE TABLE b (id INT);\nCREATE TABLE c (id INT);\n"
        );
        assert_ne!(migrations[0].checksum, migrations[1].checksum);
    }

    #[test]
    fn checksum_follows_sql() {
        let first = MigrationScript::new("--##1 first\nCREATE TABLE a (id INT);\n")
            .parse()
            .unwrap();
        let changed = MigrationScript::new("--##1 first\nCREATE TABLE a (id BIGINT);\n")
            .parse()
            .unwrap();
        let empty = MigrationScript::new("--##1 first\n").parse().unwrap();

        assert_ne!(first[0].checksum, changed[0].checksum);
        assert_ne!(first[0].checksum, empty[0].checksum);
    }

    #[test]
    fn rejects_sql_before_first_header() {
        let script = MigrationScript::new("CREATE TABLE a (id INT);\n--##1 first\n");
        assert!(script.parse().is_err());
    }

    #[test]
    fn rejects_bad_versions() {
        assert!(MigrationScript::new("--##one first\n").parse().is_err());
        assert!(MigrationScript::new("--##2 a\nSELECT 1;\n--##1 b\nSELECT 1;\n")
            .parse()
            .is_err());
    }

    #[test]
    fn embedded_script_parses() {
        let migrations = postgresql_migrations().parse().unwrap();
        let versions: Vec<i64> = migrations.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert!(migrations.iter().all(|m| !m.sql.trim().is_empty()));
    }
}
