// Schema DSL describing the ledger tables.
//
// The schema serves two purposes: SQL backends derive DDL from it, and every
// backend learns the unique-field constraints from it. `external_ref` on
// `ledger_transaction` being unique is load-bearing — it is the idempotency
// key space for webhook replays and referral payouts.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Field types supported by the schema system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
}

/// A single field definition within a table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaField {
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    /// Foreign-key reference, as `(table, field)`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub references: Option<(String, String)>,
}

impl SchemaField {
    pub fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: true,
            unique: false,
            default_value: None,
            references: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn integer() -> Self {
        Self::new(FieldType::Integer)
    }

    pub fn float() -> Self {
        Self::new(FieldType::Float)
    }

    pub fn boolean(default: bool) -> Self {
        Self {
            default_value: Some(serde_json::Value::Bool(default)),
            ..Self::new(FieldType::Boolean)
        }
    }

    pub fn date() -> Self {
        Self::new(FieldType::Date)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<serde_json::Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_reference(mut self, table: &str, field: &str) -> Self {
        self.references = Some((table.to_string(), field.to_string()));
        self
    }
}

/// A complete table definition within the ledger schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTable {
    pub name: String,
    pub fields: HashMap<String, SchemaField>,
}

impl LedgerTable {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: HashMap::new(),
        }
    }

    pub fn field(mut self, name: &str, schema_field: SchemaField) -> Self {
        self.fields.insert(name.to_string(), schema_field);
        self
    }

    /// Names of the unique fields in this table.
    pub fn unique_fields(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(_, f)| f.unique)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// The complete ledger database schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerSchema {
    pub tables: HashMap<String, LedgerTable>,
}

impl LedgerSchema {
    pub fn new() -> Self {
        Self {
            tables: HashMap::new(),
        }
    }

    pub fn table(mut self, table: LedgerTable) -> Self {
        self.tables.insert(table.name.clone(), table);
        self
    }

    /// Build the core ledger schema: balance, transaction log, payment
    /// sessions, subscriptions, and referral links.
    pub fn core_schema() -> Self {
        let balance = LedgerTable::new("balance")
            .field("user_id", SchemaField::string().with_unique())
            .field("balance", SchemaField::integer().with_default(0))
            .field("total_earned", SchemaField::integer().with_default(0))
            .field("total_spent", SchemaField::integer().with_default(0))
            // Monotonic counter; every balance write is conditional on it.
            .field("version", SchemaField::integer().with_default(0))
            .field("created_at", SchemaField::date())
            .field("updated_at", SchemaField::date());

        let ledger_transaction = LedgerTable::new("ledger_transaction")
            .field("id", SchemaField::string().with_unique())
            .field("user_id", SchemaField::string().with_reference("balance", "user_id"))
            .field("amount", SchemaField::integer())
            .field("kind", SchemaField::string())
            .field("description", SchemaField::string())
            .field("status", SchemaField::string().with_default("pending"))
            .field("external_ref", SchemaField::string().optional().with_unique())
            .field("created_at", SchemaField::date());

        let payment_session = LedgerTable::new("payment_session")
            .field("id", SchemaField::string().with_unique())
            .field("user_id", SchemaField::string())
            .field("plan_id", SchemaField::string())
            .field("interval", SchemaField::string())
            .field("requested_amount", SchemaField::float())
            .field("pay_currency", SchemaField::string())
            .field("provider", SchemaField::string())
            .field("provider_payment_id", SchemaField::string().with_unique())
            .field("status", SchemaField::string().with_default("pending"))
            .field("ledger_transaction_id", SchemaField::string().optional())
            .field("created_at", SchemaField::date())
            .field("expires_at", SchemaField::date());

        let subscription = LedgerTable::new("subscription")
            .field("id", SchemaField::string().with_unique())
            .field("user_id", SchemaField::string())
            .field("plan_id", SchemaField::string())
            .field("status", SchemaField::string().with_default("active"))
            .field("period_start", SchemaField::date())
            .field("period_end", SchemaField::date())
            .field("payment_provider", SchemaField::string())
            .field("created_at", SchemaField::date());

        let referral_link = LedgerTable::new("referral_link")
            .field("id", SchemaField::string().with_unique())
            .field("referrer_id", SchemaField::string())
            .field("referred_id", SchemaField::string().with_unique())
            .field("status", SchemaField::string().with_default("pending"))
            .field("commission_paid", SchemaField::boolean(false))
            .field("commission_amount", SchemaField::integer().with_default(0))
            .field("created_at", SchemaField::date());

        Self::new()
            .table(balance)
            .table(ledger_transaction)
            .table(payment_session)
            .table(subscription)
            .table(referral_link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_schema_has_all_tables() {
        let schema = LedgerSchema::core_schema();
        for table in [
            "balance",
            "ledger_transaction",
            "payment_session",
            "subscription",
            "referral_link",
        ] {
            assert!(schema.tables.contains_key(table), "missing table {table}");
        }
    }

    #[test]
    fn external_ref_is_unique() {
        let schema = LedgerSchema::core_schema();
        let txn = &schema.tables["ledger_transaction"];
        assert!(txn.unique_fields().contains(&"external_ref"));
        // but not required — most transactions have no external origin
        assert!(!txn.fields["external_ref"].required);
    }

    #[test]
    fn provider_payment_id_is_unique() {
        let schema = LedgerSchema::core_schema();
        let sessions = &schema.tables["payment_session"];
        assert!(sessions.unique_fields().contains(&"provider_payment_id"));
    }
}
