// SPDX-FileCopyrightText: © 2026 Kubvernor authors
// SPDX-License-Identifier: GPL-3.0-only
// Copyright (C) 2026 Kubvernor authors.
//         This program is free software: you can redistribute it and/or modify it under the terms of the GNU General Public License as published by the Free Software Foundation, version 3.
//         This program is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//         You should have received a copy of the GNU General Public License along with this program. If not, see <https://www.gnu.org/licenses/>.
//
//

//! Resource kinds the controllers read and write.

pub mod certmanager;
pub mod conditions;
pub mod istio;
pub mod networking;
pub mod serving;

pub use conditions::{Condition, ConditionStatus};
pub use istio::{Gateway, VirtualService};
pub use networking::{Certificate, ClusterIngress};
pub use serving::{Configuration, Revision, Route};

pub type CertManagerCertificate = certmanager::Certificate;
