/////////////////////////////////////////////////////////////////////////////////////////////
//
// Groups the domain decomposition and Schwarz preconditioning modules for RBF solves.
//
// Copyright (c) 2025, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

pub mod domain;
pub mod domain_decomposition;
pub mod schwarz;

pub use schwarz::RasPreconditioner;
