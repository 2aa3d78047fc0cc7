mod mapping;
mod query;
