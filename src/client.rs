//! Document store seam.
//!
//! Every request planned by the mapper goes through [`DocumentClient`],
//! implemented for [`aws_sdk_dynamodb::Client`].

use crate::{
    common::Item,
    error::{CancellationReason, Error, Result},
    read::{
        batch_get_item::{BatchGetItemInput, BatchGetItemOutput},
        get_item::GetItemInput,
        query::{QueryInput, QueryOutput},
        scan::{ScanInput, ScanOutput},
    },
    write::{
        batch_write_item::{BatchWriteItemInput, BatchWriteItemOutput},
        common::TransactWriteItem,
        delete_item::DeleteItemInput,
        put_item::PutItemInput,
        update_item::UpdateItemInput,
    },
};

use async_trait::async_trait;
use aws_sdk_dynamodb::{
    Client,
    operation::{
        transact_get_items::TransactGetItemsError, transact_write_items::TransactWriteItemsError,
    },
    types,
};
use std::sync::Arc;

/// Requests sent for one batch chunk before its unprocessed items are
/// reported as [`Error::UnprocessedBatchItems`].
pub const MAX_BATCH_ATTEMPTS: usize = 5;

/// Requests the mapper sends to DynamoDB.
#[async_trait]
pub trait DocumentClient: Send + Sync {
    /// Create or replace one item.
    async fn put_item(&self, input: PutItemInput) -> Result<()>;

    /// Read one item, `None` when it does not exist.
    async fn get_item(&self, input: GetItemInput) -> Result<Option<Item>>;

    /// Update one item, returning the attributes selected by the request.
    async fn update_item(&self, input: UpdateItemInput) -> Result<Option<Item>>;

    /// Delete one item.
    async fn delete_item(&self, input: DeleteItemInput) -> Result<()>;

    /// Read one page of a query.
    async fn query(&self, input: QueryInput) -> Result<QueryOutput>;

    /// Read one page of a scan.
    async fn scan(&self, input: ScanInput) -> Result<ScanOutput>;

    /// Read up to 100 items of one table, returning the keys left unread.
    async fn batch_get_item(&self, input: BatchGetItemInput) -> Result<BatchGetItemOutput>;

    /// Apply up to 25 writes to one table, returning the writes left unapplied.
    async fn batch_write_item(&self, input: BatchWriteItemInput) -> Result<BatchWriteItemOutput>;

    /// Apply every write atomically.
    ///
    /// A cancelled transaction fails with [`Error::TransactionCancelled`].
    async fn transact_write_items(&self, items: Vec<TransactWriteItem>) -> Result<()>;

    /// Read every item atomically, in request order.
    ///
    /// A cancelled transaction fails with [`Error::TransactionCancelled`].
    async fn transact_get_items(&self, items: Vec<GetItemInput>) -> Result<Vec<Option<Item>>>;
}

fn cancellation_reasons(reasons: &[types::CancellationReason]) -> Vec<CancellationReason> {
    reasons
        .iter()
        .map(|reason| CancellationReason {
            code: reason.code().map(str::to_string),
            message: reason.message().map(str::to_string),
        })
        .collect()
}

#[async_trait]
impl DocumentClient for Client {
    async fn put_item(&self, input: PutItemInput) -> Result<()> {
        input.send(self).await
    }

    async fn get_item(&self, input: GetItemInput) -> Result<Option<Item>> {
        input.send(self).await
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<Option<Item>> {
        input.send(self).await
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<()> {
        input.send(self).await
    }

    async fn query(&self, input: QueryInput) -> Result<QueryOutput> {
        input.send(self).await
    }

    async fn scan(&self, input: ScanInput) -> Result<ScanOutput> {
        input.send(self).await
    }

    async fn batch_get_item(&self, input: BatchGetItemInput) -> Result<BatchGetItemOutput> {
        input.send(self).await
    }

    async fn batch_write_item(&self, input: BatchWriteItemInput) -> Result<BatchWriteItemOutput> {
        input.send(self).await
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.transact_write_items", skip_all, err)
    )]
    async fn transact_write_items(&self, items: Vec<TransactWriteItem>) -> Result<()> {
        let items = items
            .into_iter()
            .map(TransactWriteItem::into_transact_write_item)
            .collect::<Result<Vec<_>>>()?;
        Client::transact_write_items(self)
            .set_transact_items(Some(items))
            .send()
            .await
            .map_err(|error| match error.as_service_error() {
                Some(TransactWriteItemsError::TransactionCanceledException(exception)) => {
                    Error::TransactionCancelled {
                        reasons: cancellation_reasons(exception.cancellation_reasons()),
                    }
                }
                _ => Error::store(error),
            })?;
        Ok(())
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.transact_get_items", skip_all, err)
    )]
    async fn transact_get_items(&self, items: Vec<GetItemInput>) -> Result<Vec<Option<Item>>> {
        let items = items
            .into_iter()
            .map(GetItemInput::into_transact_get_item)
            .collect::<Result<Vec<_>>>()?;
        let output = Client::transact_get_items(self)
            .set_transact_items(Some(items))
            .send()
            .await
            .map_err(|error| match error.as_service_error() {
                Some(TransactGetItemsError::TransactionCanceledException(exception)) => {
                    Error::TransactionCancelled {
                        reasons: cancellation_reasons(exception.cancellation_reasons()),
                    }
                }
                _ => Error::store(error),
            })?;
        Ok(output
            .responses
            .unwrap_or_default()
            .into_iter()
            .map(|response| response.item)
            .collect())
    }
}

#[async_trait]
impl<C: DocumentClient + ?Sized> DocumentClient for Arc<C> {
    async fn put_item(&self, input: PutItemInput) -> Result<()> {
        (**self).put_item(input).await
    }

    async fn get_item(&self, input: GetItemInput) -> Result<Option<Item>> {
        (**self).get_item(input).await
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<Option<Item>> {
        (**self).update_item(input).await
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<()> {
        (**self).delete_item(input).await
    }

    async fn query(&self, input: QueryInput) -> Result<QueryOutput> {
        (**self).query(input).await
    }

    async fn scan(&self, input: ScanInput) -> Result<ScanOutput> {
        (**self).scan(input).await
    }

    async fn batch_get_item(&self, input: BatchGetItemInput) -> Result<BatchGetItemOutput> {
        (**self).batch_get_item(input).await
    }

    async fn batch_write_item(&self, input: BatchWriteItemInput) -> Result<BatchWriteItemOutput> {
        (**self).batch_write_item(input).await
    }

    async fn transact_write_items(&self, items: Vec<TransactWriteItem>) -> Result<()> {
        (**self).transact_write_items(items).await
    }

    async fn transact_get_items(&self, items: Vec<GetItemInput>) -> Result<Vec<Option<Item>>> {
        (**self).transact_get_items(items).await
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;

    use crate::write::batch_write_item::BatchWriteRequest;

    use std::{
        collections::{HashMap, VecDeque},
        sync::Mutex,
    };

    /// Request received by [`MockClient`].
    #[derive(Clone, Debug, PartialEq)]
    pub(crate) enum Request {
        Put(PutItemInput),
        Get(GetItemInput),
        Update(UpdateItemInput),
        Delete(DeleteItemInput),
        Query(QueryInput),
        Scan(ScanInput),
        BatchGet(BatchGetItemInput),
        BatchWrite(BatchWriteItemInput),
        TransactWrite(Vec<TransactWriteItem>),
        TransactGet(Vec<GetItemInput>),
    }

    /// In memory client keyed by `PK` and `SK`.
    ///
    /// Conditions and update expressions are not evaluated: puts store the
    /// item, deletes drop it and updates answer with the scripted response,
    /// or the stored item when none is left. Batch requests leave their last
    /// items unprocessed as scripted.
    #[derive(Debug, Default)]
    pub(crate) struct MockClient {
        items: Mutex<HashMap<String, Item>>,
        query_pages: Mutex<VecDeque<QueryOutput>>,
        scan_pages: Mutex<VecDeque<ScanOutput>>,
        unprocessed: Mutex<VecDeque<usize>>,
        update_responses: Mutex<VecDeque<Option<Item>>>,
        cancellation: Mutex<Option<Vec<CancellationReason>>>,
        requests: Mutex<Vec<Request>>,
    }

    fn key_of(item: &Item) -> String {
        ["PK", "SK"]
            .iter()
            .filter_map(|name| match item.get(*name) {
                Some(types::AttributeValue::S(value)) => Some(value.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("|")
    }

    impl MockClient {
        pub(crate) fn insert(&self, item: Item) {
            self.items.lock().unwrap().insert(key_of(&item), item);
        }

        pub(crate) fn stored(&self, key: &Item) -> Option<Item> {
            self.items.lock().unwrap().get(&key_of(key)).cloned()
        }

        pub(crate) fn len(&self) -> usize {
            self.items.lock().unwrap().len()
        }

        pub(crate) fn push_query_page(&self, page: QueryOutput) {
            self.query_pages.lock().unwrap().push_back(page);
        }

        pub(crate) fn push_scan_page(&self, page: ScanOutput) {
            self.scan_pages.lock().unwrap().push_back(page);
        }

        /// Leave the last `count` items of the next batch request unprocessed.
        pub(crate) fn leave_unprocessed(&self, count: usize) {
            self.unprocessed.lock().unwrap().push_back(count);
        }

        pub(crate) fn push_update_response(&self, response: Option<Item>) {
            self.update_responses.lock().unwrap().push_back(response);
        }

        pub(crate) fn cancel_transactions(&self, reasons: Vec<CancellationReason>) {
            *self.cancellation.lock().unwrap() = Some(reasons);
        }

        pub(crate) fn requests(&self) -> Vec<Request> {
            self.requests.lock().unwrap().clone()
        }

        pub(crate) fn queries(&self) -> Vec<QueryInput> {
            self.requests()
                .into_iter()
                .filter_map(|request| match request {
                    Request::Query(input) => Some(input),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn scans(&self) -> Vec<ScanInput> {
            self.requests()
                .into_iter()
                .filter_map(|request| match request {
                    Request::Scan(input) => Some(input),
                    _ => None,
                })
                .collect()
        }

        fn split_unprocessed<T>(&self, mut items: Vec<T>) -> (Vec<T>, Vec<T>) {
            let count = self.unprocessed.lock().unwrap().pop_front().unwrap_or_default();
            let unprocessed = items.split_off(items.len().saturating_sub(count));
            (items, unprocessed)
        }

        fn record(&self, request: Request) {
            self.requests.lock().unwrap().push(request);
        }

        fn apply(&self, item: TransactWriteItem) {
            match item {
                TransactWriteItem::Put(input) => self.insert(input.item),
                TransactWriteItem::Update(_) => {}
                TransactWriteItem::Delete(input) => {
                    self.items.lock().unwrap().remove(&key_of(&input.key));
                }
            }
        }
    }

    #[async_trait]
    impl DocumentClient for MockClient {
        async fn put_item(&self, input: PutItemInput) -> Result<()> {
            self.record(Request::Put(input.clone()));
            self.apply(TransactWriteItem::Put(input));
            Ok(())
        }

        async fn get_item(&self, input: GetItemInput) -> Result<Option<Item>> {
            self.record(Request::Get(input.clone()));
            Ok(self.stored(&input.key))
        }

        async fn update_item(&self, input: UpdateItemInput) -> Result<Option<Item>> {
            self.record(Request::Update(input.clone()));
            let scripted = self.update_responses.lock().unwrap().pop_front();
            Ok(scripted.unwrap_or_else(|| self.stored(&input.key)))
        }

        async fn delete_item(&self, input: DeleteItemInput) -> Result<()> {
            self.record(Request::Delete(input.clone()));
            self.apply(TransactWriteItem::Delete(input));
            Ok(())
        }

        async fn query(&self, input: QueryInput) -> Result<QueryOutput> {
            self.record(Request::Query(input));
            Ok(self
                .query_pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default())
        }

        async fn scan(&self, input: ScanInput) -> Result<ScanOutput> {
            self.record(Request::Scan(input));
            Ok(self
                .scan_pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_default())
        }

        async fn batch_get_item(&self, input: BatchGetItemInput) -> Result<BatchGetItemOutput> {
            self.record(Request::BatchGet(input.clone()));
            let (keys, unprocessed_keys) = self.split_unprocessed(input.keys);
            Ok(BatchGetItemOutput {
                items: keys.iter().filter_map(|key| self.stored(key)).collect(),
                unprocessed_keys,
            })
        }

        async fn batch_write_item(&self, input: BatchWriteItemInput) -> Result<BatchWriteItemOutput> {
            self.record(Request::BatchWrite(input.clone()));
            let (requests, unprocessed_requests) = self.split_unprocessed(input.requests);
            for request in requests {
                match request {
                    BatchWriteRequest::Put(item) => self.insert(item),
                    BatchWriteRequest::Delete(key) => {
                        self.items.lock().unwrap().remove(&key_of(&key));
                    }
                }
            }
            Ok(BatchWriteItemOutput {
                unprocessed_requests,
            })
        }

        async fn transact_write_items(&self, items: Vec<TransactWriteItem>) -> Result<()> {
            self.record(Request::TransactWrite(items.clone()));
            if let Some(reasons) = self.cancellation.lock().unwrap().clone() {
                return Err(Error::TransactionCancelled { reasons });
            }
            for item in items {
                self.apply(item);
            }
            Ok(())
        }

        async fn transact_get_items(&self, items: Vec<GetItemInput>) -> Result<Vec<Option<Item>>> {
            self.record(Request::TransactGet(items.clone()));
            if let Some(reasons) = self.cancellation.lock().unwrap().clone() {
                return Err(Error::TransactionCancelled { reasons });
            }
            Ok(items.iter().map(|input| self.stored(&input.key)).collect())
        }
    }
}
