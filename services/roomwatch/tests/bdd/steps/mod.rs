mod api_steps;
mod catalog_steps;
mod query_steps;
