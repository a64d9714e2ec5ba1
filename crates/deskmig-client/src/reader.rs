//! Schema reader: paginated reads of field and form collections.

use futures::stream::{self, Stream, TryStreamExt};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use deskmig_proto::{
    FieldCategory, FieldDefinition, InstanceSchema, Page, TicketForm, WireField, WireForm,
};

use crate::error::Error;
use crate::executor::RequestExecutor;
use crate::request::ApiRequest;

const FORMS_ENDPOINT: &str = "ticket_forms";

enum PageCursor {
    Start,
    After(String),
    Done,
}

/// Reads the complete field and form configuration of one instance.
#[derive(Clone)]
pub struct SchemaReader {
    executor: RequestExecutor,
}

impl SchemaReader {
    /// Create a reader on top of an executor.
    pub fn new(executor: RequestExecutor) -> Self {
        Self { executor }
    }

    /// Lazy sequence of pages of `endpoint`, following `meta.after_cursor`
    /// until the server reports no more pages.
    ///
    /// A failing page ends the stream with [`Error::Fetch`], carrying the
    /// cursor of the last page that was read successfully.
    pub fn pages<T>(&self, endpoint: &'static str) -> impl Stream<Item = Result<Vec<T>, Error>> + '_
    where
        T: DeserializeOwned + Send + 'static,
    {
        stream::try_unfold(PageCursor::Start, move |cursor| async move {
            let after = match cursor {
                PageCursor::Done => return Ok(None),
                PageCursor::Start => None,
                PageCursor::After(cursor) => Some(cursor),
            };

            let fetch_error = |source: Error| Error::Fetch {
                endpoint: endpoint.to_string(),
                last_cursor: after.clone(),
                source: Box::new(source),
            };

            let page: Page<T> = self
                .fetch_page(endpoint, after.as_deref())
                .await
                .map_err(&fetch_error)?;

            let next = if page.has_more {
                match page.after_cursor {
                    Some(cursor) => PageCursor::After(cursor),
                    None => {
                        return Err(fetch_error(Error::Decode(
                            deskmig_proto::Error::MissingKey("meta.after_cursor".into()),
                        )))
                    }
                }
            } else {
                PageCursor::Done
            };

            Ok(Some((page.items, next)))
        })
    }

    async fn fetch_page<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        after: Option<&str>,
    ) -> Result<Page<T>, Error> {
        let page_size = self.executor.config().page_size;
        let mut request = ApiRequest::get(format!("{}.json", endpoint))
            .with_query("page[size]", page_size.to_string());
        if let Some(after) = after {
            request = request.with_query("page[after]", after);
        }

        let response = self.executor.execute(&request).await?;
        let page = Page::parse(&response.body, endpoint)?;
        debug!(
            instance = %self.executor.label(),
            endpoint,
            items = page.items.len(),
            has_more = page.has_more,
            "read page"
        );
        Ok(page)
    }

    /// Every field of one category, in server order.
    pub async fn read_fields(&self, category: FieldCategory) -> Result<Vec<FieldDefinition>, Error> {
        let wire: Vec<WireField> = self.pages(category.endpoint()).try_concat().await?;
        let fields: Vec<FieldDefinition> = wire
            .into_iter()
            .map(|field| field.into_definition(category))
            .collect();
        info!(
            instance = %self.executor.label(),
            endpoint = category.endpoint(),
            count = fields.len(),
            "read fields"
        );
        Ok(fields)
    }

    /// Every ticket form, in server order.
    pub async fn read_forms(&self) -> Result<Vec<TicketForm>, Error> {
        let wire: Vec<WireForm> = self.pages(FORMS_ENDPOINT).try_concat().await?;
        let forms: Vec<TicketForm> = wire.into_iter().map(WireForm::into_form).collect();
        info!(
            instance = %self.executor.label(),
            endpoint = FORMS_ENDPOINT,
            count = forms.len(),
            "read forms"
        );
        Ok(forms)
    }

    /// Read all three field categories and the forms, sequentially.
    pub async fn read_schema(&self) -> Result<InstanceSchema, Error> {
        let mut schema = InstanceSchema::new();
        for category in FieldCategory::ALL {
            *schema.fields_mut(category) = self.read_fields(category).await?;
        }
        schema.forms = self.read_forms().await?;
        Ok(schema)
    }
}
