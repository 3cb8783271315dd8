//! Raw entry points of a compiled Neural Engine model library.
//!
//! Every model library exports the same `pyane_*` C surface. The send, read
//! and descriptor calls take one pointer per slot (or per descriptor word) as
//! separate positional arguments, so their signatures are generated here from
//! literal index lists. Use the safe wrappers in the `backend` module instead
//! of calling these directly.

use std::ffi::c_void;
use std::os::raw::c_int;

use crate::tile::{NCHW_WORDS, TILE_COUNT};

/// Opaque handle to a native model context.
pub type ContextPtr = *mut c_void;

pub const INIT: &str = "pyane_init";
pub const FREE: &str = "pyane_free";
pub const EXEC: &str = "pyane_exec";
pub const SEND: &str = "pyane_send";
pub const READ: &str = "pyane_read";
pub const TILE: &str = "pyane_tile";
pub const INFO: &str = "pyane_info";
pub const NCHW: &str = "pyane_nchw";

pub type InitFn = unsafe extern "C" fn() -> ContextPtr;
pub type FreeFn = unsafe extern "C" fn(ContextPtr);
/// Assumed to return an `int` status, zero on success. The library's
/// prototype is not shipped with it; this matches the C default return type
/// that a `ctypes` caller reads when no `restype` is declared.
pub type ExecFn = unsafe extern "C" fn(ContextPtr) -> c_int;
pub type TileFn = unsafe extern "C" fn(ContextPtr, *const c_void, *mut c_void, c_int);
pub type InfoFn = unsafe extern "C" fn(ContextPtr, *mut c_int, *mut c_int);

macro_rules! spread_entry {
    (@arg $i:literal $arg:ty) => { $arg };
    (
        $(#[$meta:meta])*
        $name:ident, $call:ident, $arg:ty, $count:expr, [$($i:literal)*]
    ) => {
        $(#[$meta])*
        pub type $name = unsafe extern "C" fn(ContextPtr, $(spread_entry!(@arg $i $arg)),*);

        /// Pass each element of `args` as its own positional argument.
        ///
        /// # Safety
        ///
        /// `f` must come from a library that is still loaded and `ctx` must be
        /// a live context created by that library.
        pub unsafe fn $call(f: $name, ctx: ContextPtr, args: &[$arg; $count]) {
            unsafe { f(ctx, $(args[$i]),*) }
        }
    };
}

spread_entry!(
    /// `pyane_send` / `pyane_read`: one buffer per slot, unused slots null.
    SlotsFn, call_slots, *mut c_void, TILE_COUNT, [
        0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
        16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31
    ]
);

spread_entry!(
    /// `pyane_nchw`: one out-pointer per descriptor word, 64 rows of six.
    NchwFn, call_nchw, *mut u64, NCHW_WORDS, [
        0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16 17 18 19 20 21 22 23
        24 25 26 27 28 29 30 31 32 33 34 35 36 37 38 39 40 41 42 43 44 45 46 47
        48 49 50 51 52 53 54 55 56 57 58 59 60 61 62 63 64 65 66 67 68 69 70 71
        72 73 74 75 76 77 78 79 80 81 82 83 84 85 86 87 88 89 90 91 92 93 94 95
        96 97 98 99 100 101 102 103 104 105 106 107 108 109 110 111 112 113 114 115 116 117 118 119
        120 121 122 123 124 125 126 127 128 129 130 131 132 133 134 135 136 137 138 139 140 141 142 143
        144 145 146 147 148 149 150 151 152 153 154 155 156 157 158 159 160 161 162 163 164 165 166 167
        168 169 170 171 172 173 174 175 176 177 178 179 180 181 182 183 184 185 186 187 188 189 190 191
        192 193 194 195 196 197 198 199 200 201 202 203 204 205 206 207 208 209 210 211 212 213 214 215
        216 217 218 219 220 221 222 223 224 225 226 227 228 229 230 231 232 233 234 235 236 237 238 239
        240 241 242 243 244 245 246 247 248 249 250 251 252 253 254 255 256 257 258 259 260 261 262 263
        264 265 266 267 268 269 270 271 272 273 274 275 276 277 278 279 280 281 282 283 284 285 286 287
        288 289 290 291 292 293 294 295 296 297 298 299 300 301 302 303 304 305 306 307 308 309 310 311
        312 313 314 315 316 317 318 319 320 321 322 323 324 325 326 327 328 329 330 331 332 333 334 335
        336 337 338 339 340 341 342 343 344 345 346 347 348 349 350 351 352 353 354 355 356 357 358 359
        360 361 362 363 364 365 366 367 368 369 370 371 372 373 374 375 376 377 378 379 380 381 382 383
    ]
);
