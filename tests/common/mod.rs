//! Shared fixtures: a temporary company database and a matching config.

#![allow(dead_code)]

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use askdb::config::{parse_config, Config};
use askdb::service::AskDb;

pub struct Fixture {
    pub tmp: TempDir,
    pub db_url: String,
}

impl Fixture {
    pub fn config(&self) -> Config {
        let toml = format!(
            r#"
[database]
url = "{url}"

[documents]
path = "{docs}"

[query]
default_page_size = 10
"#,
            url = self.db_url,
            docs = self.tmp.path().join("documents.db").display()
        );
        parse_config(&toml).unwrap()
    }

    pub async fn open(&self) -> AskDb {
        AskDb::open(self.config()).await.unwrap()
    }

    pub fn write_file(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.tmp.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }
}

/// `employees(id, name, department, salary, hire_date)` with the given rows.
pub async fn company(rows: &[(&str, &str, f64, &str)]) -> Fixture {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("company.db");
    create_db(&path, rows).await;
    Fixture {
        db_url: format!("sqlite:{}", path.display()),
        tmp,
    }
}

async fn create_db(path: &Path, rows: &[(&str, &str, f64, &str)]) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();
    sqlx::query(
        "CREATE TABLE employees (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            department TEXT NOT NULL,
            salary REAL NOT NULL,
            hire_date DATE NOT NULL
        )",
    )
    .execute(&pool)
    .await
    .unwrap();
    for (name, department, salary, hire_date) in rows {
        sqlx::query(
            "INSERT INTO employees (name, department, salary, hire_date) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(department)
        .bind(salary)
        .bind(hire_date)
        .execute(&pool)
        .await
        .unwrap();
    }
    pool.close().await;
}

/// The three-row example company.
pub async fn small_company() -> Fixture {
    company(&[
        ("Ada", "Engineering", 100.0, "2019-04-01"),
        ("Grace", "Engineering", 200.0, "2021-06-15"),
        ("Linus", "Sales", 300.0, "2022-01-10"),
    ])
    .await
}

/// 25 employees in two departments.
pub async fn large_company() -> Fixture {
    let names: Vec<String> = (1..=25).map(|i| format!("Employee {i}")).collect();
    let rows: Vec<(&str, &str, f64, &str)> = names
        .iter()
        .enumerate()
        .map(|(i, n)| {
            let dept = if i % 2 == 0 { "Engineering" } else { "Sales" };
            (n.as_str(), dept, 1000.0 + i as f64 * 100.0, "2020-01-01")
        })
        .collect();
    company(&rows).await
}
