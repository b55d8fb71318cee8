// SimpleDBM Index Managers

pub mod btree;
