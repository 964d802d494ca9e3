//! Account directory.
//!
//! The account service owns `users` and `auth_tokens`, including registration,
//! OTP and password handling, and writes tokens for its clients. The relay
//! reads both tables. `register` and `issue_token` write rows in the same
//! shape so a deployment or test can seed accounts without that service.

use rand::{distr::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::{error::ApiError, AppResult};

pub type UserId = i64;

/// Parses a user id from a route segment: ASCII digits only, greater than zero.
pub fn parse_user_id(raw: &str) -> Option<UserId> {
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse::<UserId>().ok().filter(|id| *id > 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    #[default]
    User,
    Driver,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::User => "user",
            AccountType::Driver => "driver",
        }
    }

    fn from_db(value: &str) -> AccountType {
        match value {
            "driver" => AccountType::Driver,
            _ => AccountType::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: UserId,
    pub username: String,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub account_type: AccountType,
    pub is_active: bool,
}

impl Account {
    /// Email if the account has one, phone otherwise.
    pub fn contact(&self) -> &str {
        self.email
            .as_deref()
            .or(self.phone.as_deref())
            .unwrap_or(&self.username)
    }
}

/// Public view of an account, as embedded in message history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactView {
    pub id: UserId,
    pub contact: String,
    pub account_type: AccountType,
    pub full_name: String,
}

impl From<&Account> for ContactView {
    fn from(account: &Account) -> Self {
        ContactView {
            id: account.id,
            contact: account.contact().to_owned(),
            account_type: account.account_type,
            full_name: account.full_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAccount {
    pub email: Option<String>,
    pub phone: Option<String>,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub account_type: AccountType,
}

type AccountRow = (i64, String, String, Option<String>, Option<String>, String, bool);

const ACCOUNT_COLUMNS: &str = "users.id,users.username,users.full_name,users.email,users.phone,\
                               users.account_type,users.is_active";

fn from_row(
    (id, username, full_name, email, phone, account_type, is_active): AccountRow,
) -> Account {
    Account {
        id,
        username,
        full_name,
        email,
        phone,
        account_type: AccountType::from_db(&account_type),
        is_active,
    }
}

/// Lower-cases the domain part, leaves the local part alone.
fn normalize_email(email: &str) -> String {
    match email.trim().rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_lowercase()),
        None => email.trim().to_owned(),
    }
}

#[derive(Debug, Clone)]
pub struct Directory {
    db_pool: SqlitePool,
}

impl Directory {
    pub fn new(db_pool: SqlitePool) -> Directory {
        Directory { db_pool }
    }

    pub async fn register(&self, new: NewAccount) -> AppResult<Account> {
        let email = new.email.filter(|e| !e.trim().is_empty()).map(|e| normalize_email(&e));
        let phone = new.phone.filter(|p| !p.trim().is_empty()).map(|p| p.trim().to_owned());

        let username = match (&email, &phone) {
            (None, None) => {
                return Err(ApiError::BadRequest("Email or phone is required".into()))?;
            }
            (Some(_), Some(_)) => {
                return Err(ApiError::BadRequest("Only one of email or phone allowed".into()))?;
            }
            (Some(email), None) => email.clone(),
            (None, Some(phone)) => phone.clone(),
        };

        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO users (username,full_name,email,phone,account_type) \
             VALUES (?,?,?,?,?) RETURNING id",
        )
        .bind(&username)
        .bind(&new.full_name)
        .bind(&email)
        .bind(&phone)
        .bind(new.account_type.as_str())
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(user_id = id, %username, "registered account");
        Ok(Account {
            id,
            username,
            full_name: new.full_name,
            email,
            phone,
            account_type: new.account_type,
            is_active: true,
        })
    }

    pub async fn lookup(&self, id: UserId) -> Result<Option<Account>, sqlx::Error> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE id=?"))
                .bind(id)
                .fetch_optional(&self.db_pool)
                .await?;
        Ok(row.map(from_row))
    }

    /// Resolves a bearer token. Inactive accounts resolve to nobody.
    pub async fn authenticate(&self, token: &str) -> Result<Option<Account>, sqlx::Error> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM auth_tokens \
             JOIN users ON users.id = auth_tokens.user_id WHERE auth_tokens.token=?"
        ))
        .bind(token)
        .fetch_optional(&self.db_pool)
        .await?;
        Ok(row.map(from_row).filter(|account| account.is_active))
    }

    pub async fn issue_token(&self, user_id: UserId) -> Result<String, sqlx::Error> {
        let token: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(40)
            .map(char::from)
            .collect();

        sqlx::query("INSERT INTO auth_tokens (token,user_id,created_at) VALUES (?,?,?)")
            .bind(&token)
            .bind(user_id)
            .bind(OffsetDateTime::now_utc().unix_timestamp())
            .execute(&self.db_pool)
            .await?;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn rider(email: &str) -> NewAccount {
        NewAccount {
            email: Some(email.to_owned()),
            full_name: "Rita Rider".to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn user_ids_are_plain_positive_digits() {
        assert_eq!(parse_user_id("5"), Some(5));
        assert_eq!(parse_user_id("0012"), Some(12));
        for raw in ["", "0", "-4", "+5", " 5", "5 ", "5x", "99999999999999999999"] {
            assert_eq!(parse_user_id(raw), None, "{raw:?}");
        }
    }

    #[tokio::test]
    async fn register_requires_exactly_one_contact() {
        let directory = Directory::new(db::memory().await);

        assert!(directory.register(NewAccount::default()).await.is_err());
        assert!(
            directory
                .register(NewAccount {
                    email: Some("a@b.c".into()),
                    phone: Some("+15550100".into()),
                    ..Default::default()
                })
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn email_domain_is_lowercased() {
        let directory = Directory::new(db::memory().await);
        let account = directory.register(rider("Rita@Example.COM")).await.unwrap();
        assert_eq!(account.contact(), "Rita@example.com");
        assert_eq!(account.username, "Rita@example.com");
    }

    #[tokio::test]
    async fn phone_accounts_use_phone_as_contact() {
        let directory = Directory::new(db::memory().await);
        let account = directory
            .register(NewAccount {
                phone: Some("+15550100".into()),
                account_type: AccountType::Driver,
                ..Default::default()
            })
            .await
            .unwrap();

        let found = directory.lookup(account.id).await.unwrap().unwrap();
        assert_eq!(found.contact(), "+15550100");
        assert_eq!(found.account_type, AccountType::Driver);
    }

    #[tokio::test]
    async fn tokens_resolve_to_active_accounts_only() {
        let directory = Directory::new(db::memory().await);
        let account = directory.register(rider("rita@example.com")).await.unwrap();
        let token = directory.issue_token(account.id).await.unwrap();

        assert_eq!(directory.authenticate(&token).await.unwrap(), Some(account.clone()));
        assert_eq!(directory.authenticate("nope").await.unwrap(), None);

        sqlx::query("UPDATE users SET is_active=0 WHERE id=?")
            .bind(account.id)
            .execute(&directory.db_pool)
            .await
            .unwrap();
        assert_eq!(directory.authenticate(&token).await.unwrap(), None);
    }
}
