use std::collections::HashMap;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue};
use aws_sdk_dynamodb::Client;
use tracing::{info, warn};

use paperboy_core::clock::epoch_now;
use paperboy_core::config::StorageConfig;

use crate::backend::StorageBackend;
use crate::error::{Result, StorageError};
use crate::types::{
    clip_error, ExecutionRecord, FailureRecord, Recipient, RecipientStatus, RecipientUpdate,
};

type Item = HashMap<String, AttributeValue>;

/// Managed-table storage on DynamoDB.
///
/// Atomicity is delegated entirely to DynamoDB's conditional writes:
/// `attribute_not_exists` for the execution slot, an `if_not_exists + :inc`
/// update for the failure counter. No client-side compare-and-swap anywhere.
///
/// DynamoDB's native TTL reaper can lag behind the expiry instant, so reads
/// of TTL-carrying records additionally filter `ttl < now`.
pub struct DynamoBackend {
    client: Client,
    recipients_table: String,
    failures_table: String,
    execution_table: String,
}

impl DynamoBackend {
    pub fn new(
        client: Client,
        recipients_table: String,
        failures_table: String,
        execution_table: String,
    ) -> Self {
        Self {
            client,
            recipients_table,
            failures_table,
            execution_table,
        }
    }

    /// Build a client from the default AWS credential chain plus the
    /// configured region, and bind the three table names.
    pub async fn connect(storage: &StorageConfig) -> Result<Self> {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(storage.aws_region.clone()))
            .load()
            .await;
        let client = Client::new(&shared);
        info!(region = %storage.aws_region, "dynamodb backend ready");
        Ok(Self::new(
            client,
            storage.recipients_table.clone(),
            storage.failures_table.clone(),
            storage.execution_table.clone(),
        ))
    }
}

#[async_trait]
impl StorageBackend for DynamoBackend {
    async fn get_recipient(&self, email: &str) -> Result<Option<Recipient>> {
        let out = self
            .client
            .get_item()
            .table_name(&self.recipients_table)
            .key("email", AttributeValue::S(email.to_string()))
            .send()
            .await
            .map_err(|e| dynamo_err("get_recipient", e))?;
        Ok(out.item.as_ref().map(item_to_recipient))
    }

    async fn put_recipient(&self, recipient: &Recipient) -> Result<()> {
        self.client
            .put_item()
            .table_name(&self.recipients_table)
            .set_item(Some(recipient_to_item(recipient)))
            .send()
            .await
            .map_err(|e| dynamo_err("put_recipient", e))?;
        info!(email = %recipient.email, "recipient stored");
        Ok(())
    }

    async fn query_recipients_by_status(
        &self,
        status: RecipientStatus,
    ) -> Result<Vec<Recipient>> {
        let mut recipients = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let out = self
                .client
                .query()
                .table_name(&self.recipients_table)
                .index_name("status-index")
                .key_condition_expression("#status = :status")
                .expression_attribute_names("#status", "status")
                .expression_attribute_values(
                    ":status",
                    AttributeValue::S(status.as_str().to_string()),
                )
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(|e| dynamo_err("query_recipients_by_status", e))?;

            recipients.extend(out.items().iter().map(item_to_recipient));
            start_key = out.last_evaluated_key;
            if start_key.is_none() {
                break;
            }
        }
        info!(%status, count = recipients.len(), "recipients queried by status");
        Ok(recipients)
    }

    async fn get_all_recipients(&self) -> Result<Vec<Recipient>> {
        let mut recipients = Vec::new();
        let mut start_key: Option<Item> = None;
        loop {
            let out = self
                .client
                .scan()
                .table_name(&self.recipients_table)
                .set_exclusive_start_key(start_key)
                .send()
                .await
                .map_err(|e| dynamo_err("get_all_recipients", e))?;

            recipients.extend(out.items().iter().map(item_to_recipient));
            start_key = out.last_evaluated_key;
            if start_key.is_none() {
                break;
            }
        }
        info!(count = recipients.len(), "all recipients listed");
        Ok(recipients)
    }

    async fn update_recipient(&self, email: &str, update: &RecipientUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(true);
        }

        // Every attribute name is aliased — "name" and "status" are DynamoDB
        // reserved words.
        let mut sets: Vec<String> = Vec::new();
        let mut removes: Vec<String> = Vec::new();
        let mut names: HashMap<String, String> = HashMap::new();
        let mut values: HashMap<String, AttributeValue> = HashMap::new();

        if let Some(name) = &update.name {
            sets.push("#name = :name".to_string());
            names.insert("#name".to_string(), "name".to_string());
            values.insert(":name".to_string(), AttributeValue::S(name.clone()));
        }
        if let Some(status) = &update.status {
            sets.push("#status = :status".to_string());
            names.insert("#status".to_string(), "status".to_string());
            values.insert(
                ":status".to_string(),
                AttributeValue::S(status.as_str().to_string()),
            );
        }
        for (field, change) in [
            ("unsubscribed_at", &update.unsubscribed_at),
            ("last_delivery_date", &update.last_delivery_date),
        ] {
            let alias = format!("#{}", field);
            match change {
                Some(Some(value)) => {
                    sets.push(format!("{} = :{}", alias, field));
                    names.insert(alias, field.to_string());
                    values.insert(format!(":{}", field), AttributeValue::S(value.clone()));
                }
                Some(None) => {
                    removes.push(alias.clone());
                    names.insert(alias, field.to_string());
                }
                None => {}
            }
        }

        let mut expression = String::new();
        if !sets.is_empty() {
            expression.push_str("SET ");
            expression.push_str(&sets.join(", "));
        }
        if !removes.is_empty() {
            if !expression.is_empty() {
                expression.push(' ');
            }
            expression.push_str("REMOVE ");
            expression.push_str(&removes.join(", "));
        }
        names.insert("#email".to_string(), "email".to_string());

        let result = self
            .client
            .update_item()
            .table_name(&self.recipients_table)
            .key("email", AttributeValue::S(email.to_string()))
            .update_expression(expression)
            .condition_expression("attribute_exists(#email)")
            .set_expression_attribute_names(Some(names))
            .set_expression_attribute_values(if values.is_empty() {
                None
            } else {
                Some(values)
            })
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(email, "recipient updated");
                Ok(true)
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                warn!(email, "update skipped: no such recipient");
                Ok(false)
            }
            Err(e) => Err(dynamo_err("update_recipient", e)),
        }
    }

    async fn delete_recipient(&self, email: &str) -> Result<bool> {
        let out = self
            .client
            .delete_item()
            .table_name(&self.recipients_table)
            .key("email", AttributeValue::S(email.to_string()))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| dynamo_err("delete_recipient", e))?;
        let removed = out.attributes.is_some();
        info!(email, removed, "recipient deleted");
        Ok(removed)
    }

    async fn get_execution(&self, execution_key: &str) -> Result<Option<ExecutionRecord>> {
        let out = self
            .client
            .get_item()
            .table_name(&self.execution_table)
            .key("execution_key", AttributeValue::S(execution_key.to_string()))
            .send()
            .await
            .map_err(|e| dynamo_err("get_execution", e))?;
        Ok(out
            .item
            .as_ref()
            .map(item_to_execution)
            .filter(|r| r.ttl >= epoch_now()))
    }

    async fn put_execution(&self, record: &ExecutionRecord) -> Result<bool> {
        let mut item = Item::new();
        item.insert(
            "execution_key".to_string(),
            AttributeValue::S(record.execution_key.clone()),
        );
        item.insert("date".to_string(), AttributeValue::S(record.date.clone()));
        item.insert(
            "mode".to_string(),
            AttributeValue::S(record.mode.as_str().to_string()),
        );
        item.insert(
            "request_id".to_string(),
            AttributeValue::S(record.request_id.clone()),
        );
        item.insert(
            "execution_time".to_string(),
            AttributeValue::S(record.execution_time.clone()),
        );
        item.insert(
            "ttl".to_string(),
            AttributeValue::N(record.ttl.to_string()),
        );

        let result = self
            .client
            .put_item()
            .table_name(&self.execution_table)
            .set_item(Some(item))
            .condition_expression("attribute_not_exists(execution_key)")
            .send()
            .await;

        match result {
            Ok(_) => {
                info!(key = %record.execution_key, "execution slot claimed");
                Ok(true)
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                warn!(key = %record.execution_key, "execution slot already claimed");
                Ok(false)
            }
            Err(e) => Err(dynamo_err("put_execution", e)),
        }
    }

    async fn delete_execution(&self, execution_key: &str) -> Result<bool> {
        let out = self
            .client
            .delete_item()
            .table_name(&self.execution_table)
            .key("execution_key", AttributeValue::S(execution_key.to_string()))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| dynamo_err("delete_execution", e))?;
        let removed = out.attributes.is_some();
        info!(key = execution_key, removed, "execution slot deleted");
        Ok(removed)
    }

    async fn get_failure(&self, date: &str) -> Result<Option<FailureRecord>> {
        let out = self
            .client
            .get_item()
            .table_name(&self.failures_table)
            .key("date", AttributeValue::S(date.to_string()))
            .send()
            .await
            .map_err(|e| dynamo_err("get_failure", e))?;
        Ok(out
            .item
            .as_ref()
            .map(item_to_failure)
            .filter(|r| r.ttl.map_or(true, |ttl| ttl >= epoch_now())))
    }

    async fn increment_failure(&self, date: &str, error: &str) -> Result<i64> {
        let now = paperboy_core::clock::now_rfc3339();
        let ttl = paperboy_core::clock::ttl_epoch(paperboy_core::config::RECORD_TTL_DAYS);

        let out = self
            .client
            .update_item()
            .table_name(&self.failures_table)
            .key("date", AttributeValue::S(date.to_string()))
            .update_expression(
                "SET failure_count = if_not_exists(failure_count, :zero) + :inc, \
                 last_error = :error, updated_at = :now, ttl = :ttl",
            )
            .expression_attribute_values(":zero", AttributeValue::N("0".to_string()))
            .expression_attribute_values(":inc", AttributeValue::N("1".to_string()))
            .expression_attribute_values(":error", AttributeValue::S(clip_error(error)))
            .expression_attribute_values(":now", AttributeValue::S(now))
            .expression_attribute_values(":ttl", AttributeValue::N(ttl.to_string()))
            .return_values(ReturnValue::UpdatedNew)
            .send()
            .await
            .map_err(|e| dynamo_err("increment_failure", e))?;

        let new_count = out
            .attributes
            .as_ref()
            .and_then(|attrs| attr_n(attrs, "failure_count"))
            .ok_or_else(|| {
                StorageError::Corrupt("increment_failure returned no failure_count".to_string())
            })?;
        info!(date, new_count, "failure count incremented");
        Ok(new_count)
    }

    async fn delete_failure(&self, date: &str) -> Result<bool> {
        let out = self
            .client
            .delete_item()
            .table_name(&self.failures_table)
            .key("date", AttributeValue::S(date.to_string()))
            .return_values(ReturnValue::AllOld)
            .send()
            .await
            .map_err(|e| dynamo_err("delete_failure", e))?;
        let removed = out.attributes.is_some();
        info!(date, removed, "failure record deleted");
        Ok(removed)
    }
}

fn dynamo_err(op: &'static str, err: impl std::error::Error) -> StorageError {
    StorageError::Dynamo {
        op,
        message: format!("{}", DisplayErrorContext(err)),
    }
}

fn attr_s(item: &Item, key: &str) -> Option<String> {
    item.get(key).and_then(|v| v.as_s().ok()).cloned()
}

fn attr_n(item: &Item, key: &str) -> Option<i64> {
    item.get(key)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse().ok())
}

fn item_to_recipient(item: &Item) -> Recipient {
    Recipient {
        email: attr_s(item, "email").unwrap_or_default(),
        name: attr_s(item, "name").unwrap_or_default(),
        status: attr_s(item, "status")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default(),
        created_at: attr_s(item, "created_at").unwrap_or_default(),
        unsubscribed_at: attr_s(item, "unsubscribed_at"),
        last_delivery_date: attr_s(item, "last_delivery_date"),
    }
}

/// Optional fields are omitted rather than stored as NULL, so reads can
/// treat "attribute missing" uniformly.
fn recipient_to_item(recipient: &Recipient) -> Item {
    let mut item = Item::new();
    item.insert(
        "email".to_string(),
        AttributeValue::S(recipient.email.clone()),
    );
    item.insert(
        "name".to_string(),
        AttributeValue::S(recipient.name.clone()),
    );
    item.insert(
        "status".to_string(),
        AttributeValue::S(recipient.status.as_str().to_string()),
    );
    item.insert(
        "created_at".to_string(),
        AttributeValue::S(recipient.created_at.clone()),
    );
    if let Some(unsubscribed_at) = &recipient.unsubscribed_at {
        item.insert(
            "unsubscribed_at".to_string(),
            AttributeValue::S(unsubscribed_at.clone()),
        );
    }
    if let Some(last_delivery_date) = &recipient.last_delivery_date {
        item.insert(
            "last_delivery_date".to_string(),
            AttributeValue::S(last_delivery_date.clone()),
        );
    }
    item
}

fn item_to_execution(item: &Item) -> ExecutionRecord {
    ExecutionRecord {
        execution_key: attr_s(item, "execution_key").unwrap_or_default(),
        date: attr_s(item, "date").unwrap_or_default(),
        mode: attr_s(item, "mode")
            .and_then(|s| s.parse().ok())
            .unwrap_or_default(),
        request_id: attr_s(item, "request_id").unwrap_or_default(),
        execution_time: attr_s(item, "execution_time").unwrap_or_default(),
        ttl: attr_n(item, "ttl").unwrap_or_default(),
    }
}

fn item_to_failure(item: &Item) -> FailureRecord {
    FailureRecord {
        date: attr_s(item, "date").unwrap_or_default(),
        failure_count: attr_n(item, "failure_count").unwrap_or_default(),
        last_error: attr_s(item, "last_error"),
        updated_at: attr_s(item, "updated_at"),
        ttl: attr_n(item, "ttl"),
    }
}
