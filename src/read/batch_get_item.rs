use crate::{
    client::{DocumentClient, MAX_BATCH_ATTEMPTS},
    common::Item,
    error::{Error, Result},
    read::{self, get_item::FindOneOptions},
    transformer::RequestTransformer,
};

use aws_sdk_dynamodb::{Client, types};
use serde::Serialize;

/// Keys DynamoDB reads in one batch get request.
pub const MAX_BATCH_GET_ITEMS: usize = 100;

/// batch get item operation, on one table
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchGetItemInput {
    /// Table primary keys of the items, at most [`MAX_BATCH_GET_ITEMS`].
    pub keys: Vec<Item>,
    /// Read parameters (table name, consistency, projection).
    pub single_read_operation: read::common::SingleReadInput,
}

/// Items returned by one batch get request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchGetItemOutput {
    /// Items found, in no particular order.
    pub items: Vec<Item>,
    /// Keys DynamoDB did not read, to be sent again.
    pub unprocessed_keys: Vec<Item>,
}

impl BatchGetItemInput {
    /// Execute the batch get item operation.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.batch_get_item", skip_all, fields(keys = self.keys.len()), err)
    )]
    pub(crate) async fn send(self, client: &Client) -> Result<BatchGetItemOutput> {
        let table_name = self.single_read_operation.table_name;
        let keys_and_attributes = types::KeysAndAttributes::builder()
            .set_consistent_read(self.single_read_operation.consistent_read)
            .set_expression_attribute_names(self.single_read_operation.expression_attribute_names)
            .set_keys(Some(self.keys))
            .set_projection_expression(self.single_read_operation.projection_expression)
            .build()
            .map_err(Error::store)?;
        let output = client
            .batch_get_item()
            .request_items(table_name.clone(), keys_and_attributes)
            .send()
            .await
            .map_err(Error::store)?;
        Ok(BatchGetItemOutput {
            items: output
                .responses
                .and_then(|mut responses| responses.remove(&table_name))
                .unwrap_or_default(),
            unprocessed_keys: output
                .unprocessed_keys
                .and_then(|mut unprocessed| unprocessed.remove(&table_name))
                .map(|keys_and_attributes| keys_and_attributes.keys)
                .unwrap_or_default(),
        })
    }
}

impl RequestTransformer<'_> {
    /// Plan the read of every entity identified in `primary_key_attributes`,
    /// split in requests of at most [`MAX_BATCH_GET_ITEMS`] keys.
    ///
    /// Repeated keys are read once.
    pub fn to_batch_get_item<K: Serialize>(
        &self,
        primary_key_attributes: &[K],
        options: FindOneOptions,
    ) -> Result<Vec<BatchGetItemInput>> {
        let mut keys: Vec<Item> = Vec::with_capacity(primary_key_attributes.len());
        for attributes in primary_key_attributes {
            let key = self.primary_key(&self.serialize_primary_key_attributes(attributes)?)?;
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        let mut single_read_operation =
            read::common::SingleReadInput::new(&self.table.name).with_selection(options.selection);
        if options.consistent_read {
            single_read_operation.consistent_read = Some(true);
        }
        Ok(keys
            .chunks(MAX_BATCH_GET_ITEMS)
            .map(|keys| BatchGetItemInput {
                keys: keys.to_vec(),
                single_read_operation: single_read_operation.clone(),
            })
            .collect())
    }
}

/// Send one request, then its unprocessed keys, until every key was read.
async fn get_chunk(client: &dyn DocumentClient, mut input: BatchGetItemInput) -> Result<Vec<Item>> {
    let mut items = Vec::with_capacity(input.keys.len());
    for attempt in 1..=MAX_BATCH_ATTEMPTS {
        let single_read_operation = input.single_read_operation.clone();
        let output = client.batch_get_item(input).await?;
        items.extend(output.items);
        if output.unprocessed_keys.is_empty() {
            return Ok(items);
        }
        crate::log!(
            debug,
            attempt,
            unprocessed = output.unprocessed_keys.len(),
            "batch get left keys unprocessed"
        );
        if attempt == MAX_BATCH_ATTEMPTS {
            return Err(Error::UnprocessedBatchItems {
                count: output.unprocessed_keys.len(),
                attempts: MAX_BATCH_ATTEMPTS,
            });
        }
        input = BatchGetItemInput {
            keys: output.unprocessed_keys,
            single_read_operation,
        };
    }
    Ok(items)
}

/// Send every request concurrently and gather the items found.
pub(crate) async fn get(
    client: &dyn DocumentClient,
    inputs: Vec<BatchGetItemInput>,
) -> Result<Vec<Item>> {
    let chunks =
        futures::future::try_join_all(inputs.into_iter().map(|input| get_chunk(client, input)))
            .await?;
    Ok(chunks.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::mock::{MockClient, Request},
        schema::entity::{
            EntitySchema,
            tests::{table, user_declaration},
        },
    };

    use rstest::rstest;
    use serde_json::{Value, json};

    fn s(value: &str) -> types::AttributeValue {
        types::AttributeValue::S(value.to_string())
    }

    fn user_key(id: usize) -> Item {
        let value = s(&format!("USER#{id}"));
        Item::from([("PK".to_string(), value.clone()), ("SK".to_string(), value)])
    }

    fn batch_get(ids: impl IntoIterator<Item = usize>) -> Vec<BatchGetItemInput> {
        let table = table();
        let schema = EntitySchema::build(&table, user_declaration()).unwrap();
        let keys: Vec<Value> = ids
            .into_iter()
            .map(|id| json!({"id": id.to_string()}))
            .collect();
        RequestTransformer::new(&table, &schema)
            .to_batch_get_item(&keys, FindOneOptions::default())
            .unwrap()
    }

    #[rstest]
    #[case::single(1, vec![1])]
    #[case::full_request(100, vec![100])]
    #[case::split(250, vec![100, 100, 50])]
    fn test_to_batch_get_item_chunks(#[case] count: usize, #[case] expected: Vec<usize>) {
        let inputs = batch_get(0..count);
        let sizes: Vec<_> = inputs.iter().map(|input| input.keys.len()).collect();
        assert_eq!(sizes, expected);
        assert_eq!(inputs[0].keys[0], user_key(0));
        assert!(
            inputs
                .iter()
                .all(|input| input.single_read_operation.table_name == "test-table")
        );
    }

    #[test]
    fn test_to_batch_get_item_skips_repeated_keys() {
        let inputs = batch_get([1, 2, 1]);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].keys, vec![user_key(1), user_key(2)]);
    }

    #[tokio::test]
    async fn test_get_resends_unprocessed_keys() {
        let client = MockClient::default();
        for id in 0..150 {
            client.insert(user_key(id));
        }
        client.leave_unprocessed(10);
        let items = get(&client, batch_get(0..150)).await.unwrap();
        assert_eq!(items.len(), 150);
        let sizes: Vec<_> = client
            .requests()
            .into_iter()
            .filter_map(|request| match request {
                Request::BatchGet(input) => Some(input.keys.len()),
                _ => None,
            })
            .collect();
        assert_eq!(sizes.len(), 3);
        assert!(sizes.contains(&10));
    }

    #[tokio::test]
    async fn test_get_fails_when_keys_stay_unprocessed() {
        let client = MockClient::default();
        for _ in 0..MAX_BATCH_ATTEMPTS {
            client.leave_unprocessed(1);
        }
        let error = get(&client, batch_get([1, 2])).await.unwrap_err();
        assert!(matches!(
            error,
            Error::UnprocessedBatchItems {
                count: 1,
                attempts: MAX_BATCH_ATTEMPTS,
            }
        ));
        assert_eq!(client.requests().len(), MAX_BATCH_ATTEMPTS);
    }
}
