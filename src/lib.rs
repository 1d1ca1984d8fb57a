// ==============================================================================
// lib.rs - Cohort Splitter Library
// ==============================================================================
// Description: Library interface for the extraction and splitting stages
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

pub mod models;
pub mod genotype_converter;
pub mod chunk_filter;
pub mod storage;
pub mod checkpoint;
pub mod source_table;
pub mod fanout;
pub mod merge_sink;
pub mod config;
pub mod cohort;
pub mod variant_query;
pub mod extraction;
pub mod driver;
