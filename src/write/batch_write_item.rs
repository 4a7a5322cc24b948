use crate::{
    client::{DocumentClient, MAX_BATCH_ATTEMPTS},
    common::Item,
    error::{Error, Result},
    transformer::RequestTransformer,
};

use aws_sdk_dynamodb::{Client, types};
use serde::Serialize;

/// Writes DynamoDB applies in one batch write request.
pub const MAX_BATCH_WRITE_ITEMS: usize = 25;

/// One write of a batch.
///
/// Batch writes carry no condition: a put replaces any stored item and a
/// delete of a missing item succeeds.
#[derive(Clone, Debug, PartialEq)]
pub enum BatchWriteRequest {
    /// Full stored item to put.
    Put(Item),
    /// Table primary key of the item to delete.
    Delete(Item),
}

impl TryFrom<BatchWriteRequest> for types::WriteRequest {
    type Error = Error;

    fn try_from(request: BatchWriteRequest) -> Result<Self> {
        let builder = match request {
            BatchWriteRequest::Put(item) => {
                let put_request = types::PutRequest::builder()
                    .set_item(Some(item))
                    .build()
                    .map_err(Error::store)?;
                Self::builder().put_request(put_request)
            }
            BatchWriteRequest::Delete(key) => {
                let delete_request = types::DeleteRequest::builder()
                    .set_key(Some(key))
                    .build()
                    .map_err(Error::store)?;
                Self::builder().delete_request(delete_request)
            }
        };
        Ok(builder.build())
    }
}

impl BatchWriteRequest {
    fn from_write_request(request: types::WriteRequest) -> Option<Self> {
        match (request.put_request, request.delete_request) {
            (Some(put_request), _) => Some(Self::Put(put_request.item)),
            (None, Some(delete_request)) => Some(Self::Delete(delete_request.key)),
            (None, None) => None,
        }
    }
}

/// batch write item operation, on one table
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchWriteItemInput {
    /// Writes to apply, at most [`MAX_BATCH_WRITE_ITEMS`].
    pub requests: Vec<BatchWriteRequest>,
    /// The name of the table to write to.
    pub table_name: String,
}

/// Writes left over by one batch write request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchWriteItemOutput {
    /// Writes DynamoDB did not apply, to be sent again.
    pub unprocessed_requests: Vec<BatchWriteRequest>,
}

impl BatchWriteItemInput {
    /// Execute the batch write item operation.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.batch_write_item", skip_all, fields(requests = self.requests.len()), err)
    )]
    pub(crate) async fn send(self, client: &Client) -> Result<BatchWriteItemOutput> {
        let requests = self
            .requests
            .into_iter()
            .map(types::WriteRequest::try_from)
            .collect::<Result<Vec<_>>>()?;
        let output = client
            .batch_write_item()
            .request_items(self.table_name.clone(), requests)
            .send()
            .await
            .map_err(Error::store)?;
        Ok(BatchWriteItemOutput {
            unprocessed_requests: output
                .unprocessed_items
                .and_then(|mut unprocessed| unprocessed.remove(&self.table_name))
                .unwrap_or_default()
                .into_iter()
                .filter_map(BatchWriteRequest::from_write_request)
                .collect(),
        })
    }
}

impl RequestTransformer<'_> {
    fn check_batch_write(&self) -> Result<()> {
        match self.schema.unique_attributes().next() {
            Some(_) => Err(Error::BatchWriteWithUniqueAttributes(self.schema.name.clone())),
            None => Ok(()),
        }
    }

    /// Batch put of `entity`, replacing any stored item with the same key.
    ///
    /// Entities with unique attributes cannot be batch written.
    pub fn to_batch_put_request<E: Serialize>(&self, entity: &E) -> Result<BatchWriteRequest> {
        self.check_batch_write()?;
        let item = self.to_dynamo_item(serde_dynamo::to_item(entity)?)?;
        Ok(BatchWriteRequest::Put(item))
    }

    /// Batch delete of the entity identified by `primary_key_attributes`.
    ///
    /// Entities with unique attributes cannot be batch written.
    pub fn to_batch_delete_request<K: Serialize>(
        &self,
        primary_key_attributes: &K,
    ) -> Result<BatchWriteRequest> {
        self.check_batch_write()?;
        let attributes = self.serialize_primary_key_attributes(primary_key_attributes)?;
        Ok(BatchWriteRequest::Delete(self.primary_key(&attributes)?))
    }
}

/// Split `requests` in requests of at most [`MAX_BATCH_WRITE_ITEMS`] writes.
pub(crate) fn to_batch_write_items(
    table_name: &str,
    requests: Vec<BatchWriteRequest>,
) -> Vec<BatchWriteItemInput> {
    requests
        .chunks(MAX_BATCH_WRITE_ITEMS)
        .map(|requests| BatchWriteItemInput {
            requests: requests.to_vec(),
            table_name: table_name.to_string(),
        })
        .collect()
}

/// Send one request, then its unprocessed writes, until every write applied.
async fn write_chunk(client: &dyn DocumentClient, mut input: BatchWriteItemInput) -> Result<()> {
    for attempt in 1..=MAX_BATCH_ATTEMPTS {
        let table_name = input.table_name.clone();
        let output = client.batch_write_item(input).await?;
        if output.unprocessed_requests.is_empty() {
            return Ok(());
        }
        crate::log!(
            debug,
            attempt,
            unprocessed = output.unprocessed_requests.len(),
            "batch write left requests unprocessed"
        );
        if attempt == MAX_BATCH_ATTEMPTS {
            return Err(Error::UnprocessedBatchItems {
                count: output.unprocessed_requests.len(),
                attempts: MAX_BATCH_ATTEMPTS,
            });
        }
        input = BatchWriteItemInput {
            requests: output.unprocessed_requests,
            table_name,
        };
    }
    Ok(())
}

/// Send every request concurrently.
pub(crate) async fn write(client: &dyn DocumentClient, inputs: Vec<BatchWriteItemInput>) -> Result<()> {
    futures::future::try_join_all(inputs.into_iter().map(|input| write_chunk(client, input))).await?;
    Ok(())
}
