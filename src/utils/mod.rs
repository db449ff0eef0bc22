pub mod db_utils;
pub mod email_filter;
pub mod maintenance_cache;
pub mod pagination;
