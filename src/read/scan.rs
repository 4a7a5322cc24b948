use crate::{
    client::DocumentClient,
    common::{Item, condition::ConditionMap, selection::SelectionMap},
    error::{Error, Result},
    expression::{Expression, ExpressionKind, MergeStrategy},
    read,
    schema,
    transformer::RequestTransformer,
};

use aws_sdk_dynamodb::{Client, types};
use futures::future::BoxFuture;
use serde::Serialize;

/// scan operation
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanInput {
    /// Read parameters (table, index, filter, projection, paging).
    pub multiple_read_operation: read::common::MultipleReadInput,
    /// Segment read by this worker of a parallel scan.
    pub segment: Option<i32>,
    /// Number of segments of a parallel scan.
    pub total_segments: Option<i32>,
}

/// One page of a scan.
pub type ScanOutput = read::common::MultipleReadOutput;

impl ScanInput {
    /// Execute one page of the scan operation.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "dynamodb_odm.scan", skip_all, err)
    )]
    pub(crate) async fn send(self, client: &Client) -> Result<ScanOutput> {
        let builder = client
            .scan()
            .set_segment(self.segment)
            .set_total_segments(self.total_segments);
        let output = crate::apply_multiple_read_operation!(builder, self.multiple_read_operation)
            .send()
            .await
            .map_err(Error::store)?;
        Ok(ScanOutput {
            count: usize::try_from(output.count).unwrap_or_default(),
            items: output.items.unwrap_or_default(),
            last_evaluated_key: output.last_evaluated_key,
        })
    }
}

impl read::common::MultipleRead for ScanInput {
    fn multiple_read_operation_mut(&mut self) -> &mut read::common::MultipleReadInput {
        &mut self.multiple_read_operation
    }

    fn read_page<'a>(self, client: &'a dyn DocumentClient) -> BoxFuture<'a, Result<ScanOutput>> {
        client.scan(self)
    }
}

/// Portion of the table read by one worker of a parallel scan.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ScanSegment {
    /// Zero based segment index, below `total_segments`.
    pub segment: u32,
    /// Number of workers sharing the scan.
    pub total_segments: u32,
}

/// Options of an entity scan.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanOptions<T> {
    /// Index to scan, the table when `None`.
    pub index: Option<String>,
    /// Filter applied to the items of the entity.
    pub condition: Option<ConditionMap<T>>,
    /// Attributes to retrieve, all when `None`.
    pub selection: Option<SelectionMap>,
    /// Maximum number of items to return.
    pub limit: Option<usize>,
    /// Count matching items instead of returning them.
    pub only_count: bool,
    /// Whether to use strongly consistent reads.
    pub consistent_read: bool,
    /// Key to resume from, as returned by a previous scan.
    pub cursor: Option<Item>,
    /// Segment to read, the whole table when `None`.
    pub segment: Option<ScanSegment>,
}

impl<T> Default for ScanOptions<T> {
    fn default() -> Self {
        Self {
            index: None,
            condition: None,
            selection: None,
            limit: None,
            only_count: false,
            consistent_read: false,
            cursor: None,
            segment: None,
        }
    }
}

fn to_segment(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| Error::invalid_input(format!("scan segment {value} is out of range")))
}

impl RequestTransformer<'_> {
    /// Plan the scan of every item of the entity.
    ///
    /// Items of other entities sharing the table are filtered out on the
    /// entity name attribute, before the filter of `options`.
    pub fn to_scan_item<T: Serialize>(&self, options: ScanOptions<T>) -> Result<ScanInput> {
        if let Some(index) = &options.index {
            self.index(index)?;
        }
        let (segment, total_segments) = match options.segment {
            Some(ScanSegment {
                segment,
                total_segments,
            }) if segment >= total_segments => {
                return Err(Error::invalid_input(format!(
                    "scan segment {segment} is not below the {total_segments} total segments"
                )));
            }
            Some(ScanSegment {
                segment,
                total_segments,
            }) => (Some(to_segment(segment)?), Some(to_segment(total_segments)?)),
            None => (None, None),
        };

        let mut multiple_read_operation = read::common::MultipleReadInput {
            consistent_read: options.consistent_read.then_some(true),
            exclusive_start_key: options.cursor,
            index_name: options.index,
            limit: options.limit.map(read::common::to_limit),
            table_name: self.table.name.clone(),
            ..Default::default()
        };
        let mut filter = Expression::new(ExpressionKind::Filter).equals(
            schema::INTERNAL_ENTITY_ATTRIBUTE,
            types::AttributeValue::S(self.schema.name.clone()),
        );
        if let Some(condition) = options.condition {
            filter = filter.merge(condition.into_expression(ExpressionKind::Filter)?, MergeStrategy::And);
        }
        multiple_read_operation.filter_expression =
            Some(multiple_read_operation.merge_expression(filter.into_input()));
        match (options.only_count, options.selection) {
            (true, Some(_)) => return Err(Error::ProjectionWithCount),
            (true, None) => multiple_read_operation.select = Some(types::Select::Count),
            (false, Some(selection)) => {
                let projection = selection.into_expression();
                multiple_read_operation.projection_expression =
                    Some(multiple_read_operation.merge_expression(projection.into_input()));
            }
            (false, None) => {}
        }
        Ok(ScanInput {
            multiple_read_operation,
            segment,
            total_segments,
        })
    }
}
