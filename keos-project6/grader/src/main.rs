// This is test & bootstrap implementation.
// This file will be overwritten when grading.
#![no_std]
#![no_main]
#![allow(clippy::missing_safety_doc)]

extern crate alloc;
extern crate grading;
extern crate keos;
extern crate keos_project6;

pub mod cache;
pub mod frame;
pub mod inode;
pub mod sup_page;
pub mod support;
pub mod swap;

use keos::SystemConfigurationBuilder;

#[allow(unsafe_code)]
#[unsafe(no_mangle)]
pub unsafe fn main(_config_builder: SystemConfigurationBuilder) {
    keos::TestDriver::<()>::start([
        /* Buffer cache */
        &cache::dirty_write_back,
        &cache::write_exactly_one_byte_at_last_offset,
        &cache::zero_ignores_device_content,
        &cache::eviction_writes_back_dirty_entries,
        /* Inode layer */
        &inode::create_zero_fills_initial_length,
        &inode::grow_across_indirect_boundary,
        &inode::write_persists_after_flush,
        &inode::open_uniqueness,
        &inode::deny_write_blocks_writes,
        &inode::shrinking_write_does_not_grow,
        &inode::remove_releases_indirect_sectors,
        &inode::write_truncates_at_max_inode_len,
        /* Frame table */
        &frame::alloc_installs_mapping,
        &frame::free_unmaps_every_frame_owned_by_a_pagedir,
        &frame::second_chance_eviction_clears_the_victim_mapping,
        /* Swap */
        &swap::round_trip,
        &swap::slots_are_recycled,
        /* Supplemental page table / page_fetch */
        &sup_page::stack_growth_esp_minus_4_succeeds,
        &sup_page::stack_growth_esp_minus_32_succeeds,
        &sup_page::stack_growth_at_or_above_esp_succeeds,
        &sup_page::stack_growth_esp_minus_36_fails,
        &sup_page::stack_growth_far_from_user_top_still_succeeds,
        &sup_page::validation_mode_never_grows_the_stack,
        &sup_page::mmap_round_trip,
        &sup_page::munmap_skips_clean_pages,
        &sup_page::file_backed_pages_are_writable,
    ]);
}

#[unsafe(no_mangle)]
pub unsafe fn ap_main() {}
