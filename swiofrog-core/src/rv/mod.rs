// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Contains RISC-V debug module specific objects and routines

pub mod dm;
pub mod program;
pub mod register;
