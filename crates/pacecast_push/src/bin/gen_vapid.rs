/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use pacecast_push::VapidCredentials;

fn main() {
    let subject = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("VAPID_SUBJECT").ok())
        .unwrap_or_else(|| "mailto:admin@example.com".to_string());
    let keys = VapidCredentials::generate(subject);
    println!("VAPID_PUBLIC_KEY={}", keys.public_key_base64url());
    println!("VAPID_PRIVATE_KEY={}", keys.private_key_base64url());
    println!("VAPID_SUBJECT={}", keys.subject());
}
