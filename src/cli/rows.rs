use caspio_client::caspio::{ApiResponse, Query, ResourceKind, TableOperations};
use caspio_client::config::Config;
use caspio_client::error::{AppError, Result};
use clap::{Args, Subcommand};
use serde_json::Value;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum RowsAction {
    /// Print every matching row, following pages
    List {
        #[command(flatten)]
        source: Source,
        /// Filter predicate, e.g. "Status='Open'"
        #[arg(long = "where")]
        predicate: Option<String>,
    },
    /// Insert a row from a JSON object
    Insert {
        #[arg(long)]
        table: String,
        #[arg(long)]
        data: String,
    },
    /// Update matching rows with the fields of a JSON object
    Update {
        #[arg(long)]
        table: String,
        #[arg(long = "where")]
        predicate: String,
        #[arg(long)]
        data: String,
    },
    /// Delete matching rows
    Delete {
        #[arg(long)]
        table: String,
        #[arg(long = "where")]
        predicate: String,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct Source {
    #[arg(long)]
    table: Option<String>,
    #[arg(long)]
    view: Option<String>,
}

impl Source {
    fn resolve(&self) -> Result<(ResourceKind, &str)> {
        match (&self.table, &self.view) {
            (Some(table), _) => Ok((ResourceKind::Tables, table.as_str())),
            (None, Some(view)) => Ok((ResourceKind::Views, view.as_str())),
            (None, None) => Err(AppError::Config(
                "Either --table or --view is required".to_string(),
            )),
        }
    }
}

impl RowsAction {
    pub async fn execute(&self) -> Result<()> {
        let config = Config::load()?;
        let client = super::connect(&config)?;

        let output = self.run(&client).await?;
        println!("{}", serde_json::to_string_pretty(&output)?);

        Ok(())
    }

    async fn run<C: TableOperations + Sync>(&self, client: &C) -> Result<Value> {
        match self {
            RowsAction::List { source, predicate } => {
                let (kind, name) = source.resolve()?;
                let query = match predicate {
                    Some(predicate) => Query::where_clause(predicate.as_str()),
                    None => Query::new(),
                };

                let response = check(client.get_all_rows(kind, name, &query).await?)?;
                let rows = response.into_rows().unwrap_or_default();
                info!(rows = rows.len(), "Rows fetched");

                Ok(Value::Array(rows))
            }
            RowsAction::Insert { table, data } => {
                let data: Value = serde_json::from_str(data)?;
                Ok(check(client.insert_row(table, &data).await?)?.body)
            }
            RowsAction::Update {
                table,
                predicate,
                data,
            } => {
                let data: Value = serde_json::from_str(data)?;
                let query = Query::where_clause(predicate.as_str());
                Ok(check(client.update_rows(table, &query, &data).await?)?.body)
            }
            RowsAction::Delete { table, predicate } => {
                let query = Query::where_clause(predicate.as_str());
                Ok(check(client.delete_rows(table, &query).await?)?.body)
            }
        }
    }
}

fn check(response: ApiResponse) -> Result<ApiResponse> {
    if !response.status.is_success() {
        return Err(AppError::Api(format!(
            "{} - {}",
            response.status, response.body
        )));
    }

    Ok(response)
}
